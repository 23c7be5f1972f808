pub mod answer_ledger;
pub mod autosave;
pub mod contest_unlock;
pub mod exam_layout;
pub mod exam_session;
pub mod exam_timer;
pub mod http_backend;
pub mod remote;

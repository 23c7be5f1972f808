pub mod answer;
pub mod contest;
pub mod exam;
pub mod submission;
pub mod types;

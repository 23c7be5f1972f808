pub mod session_driver;

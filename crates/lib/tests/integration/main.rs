mod common;

mod action_tests;
mod driver_tests;
mod label_tests;
mod scheduler_tests;

//! # marlkit-course: scripted action courses
//!
//! A course is a fixed pair of action sequences, one per agent, replayed in a
//! two-agent cooking episode. Courses live in a JSON-lines file, one
//! `{"actions_1": [...], "actions_2": [...]}` record per line; the line
//! number is the course index.

pub mod action;
pub mod store;

pub use action::{Action, ActionError, generate_random_actions, generate_with};
pub use store::{CourseRecord, CourseStore, append, read_all, read_nth};

pub mod backup;
pub mod blocks;
pub mod core;
pub mod curriculum;
pub mod diag;
pub mod grades;
pub mod schedules;

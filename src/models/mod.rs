pub mod exam_attempt;
pub mod ranking_entry;

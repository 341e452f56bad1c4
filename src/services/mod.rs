pub mod grading_service;
pub mod queue_service;
pub mod ranking_service;
pub mod scoring_service;

pub mod domain;
pub mod expander;
pub mod images;
pub mod outline;
pub mod ports;
pub mod state;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use domain::{
    ContentDepth, Course, CourseCover, CourseModule, DepthConfig, ImageKey, ImageSlot,
    OutlineModule, QuizQuestion, QuizScore, SavedCourse, SavedCourseBody, Slide, SlideContent,
};
pub use expander::CourseExpander;
pub use images::{ImageBatchReport, ImageOrchestrator, ImageRequest, ImageSettings};
pub use outline::OutlineGenerator;
pub use ports::{
    ImageModel, ImageStorageService, PortError, PortResult, SavedCourseStore, StructuredRequest,
    TextGenerationService,
};
pub use state::{CourseStage, SessionAction, SessionState, TransitionError, ViewMode};
pub use store::MemoryCourseStore;
pub use workflow::CourseWorkflow;

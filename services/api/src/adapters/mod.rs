pub mod course_store;
pub mod image_gen;
pub mod s3;
pub mod text_llm;

pub use course_store::JsonFileCourseStore;
pub use image_gen::OpenAiImageModel;
pub use s3::S3ImageStorage;
pub use text_llm::OpenAiTextAdapter;

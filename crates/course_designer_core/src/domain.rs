//! crates/course_designer_core/src/domain.rs
//!
//! Defines the core data structures for the application: courses, their modules,
//! slides and quizzes, and the saved-course envelope.
//! Field names on the wire follow the JSON layout the browser client consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of slides requested for every module.
pub const SLIDES_PER_MODULE: usize = 3;

/// Number of quiz questions requested for every module.
pub const QUIZ_QUESTIONS_PER_MODULE: usize = 3;

/// Number of answer options every quiz question must carry.
pub const QUIZ_OPTIONS: usize = 4;

/// Bounds on the number of modules a user may ask for in an outline.
pub const MIN_MODULES: usize = 1;
pub const MAX_MODULES: usize = 3;

//=========================================================================================
// Content Depth
//=========================================================================================

/// Verbosity tier for generated slide content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentDepth {
    #[default]
    Low,
    Medium,
    High,
}

/// How much text each slide gets at a given depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthConfig {
    pub summary_words: usize,
    pub details_items: usize,
    pub deep_dive_items: usize,
}

impl ContentDepth {
    pub fn config(self) -> DepthConfig {
        match self {
            ContentDepth::Low => DepthConfig {
                summary_words: 100,
                details_items: 2,
                deep_dive_items: 1,
            },
            ContentDepth::Medium => DepthConfig {
                summary_words: 150,
                details_items: 3,
                deep_dive_items: 2,
            },
            ContentDepth::High => DepthConfig {
                summary_words: 200,
                details_items: 4,
                deep_dive_items: 3,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentDepth::Low => "Low",
            ContentDepth::Medium => "Medium",
            ContentDepth::High => "High",
        }
    }
}

//=========================================================================================
// Course Structure
//=========================================================================================

/// A module stub produced by the outline step, before any content exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineModule {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// The course-level introductory image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCover {
    pub image_prompt: String,
    #[serde(rename = "imageUrl", default)]
    pub image_url: String,
}

/// The text body of a slide. All three keys must be present when parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideContent {
    pub summary: String,
    pub details: Vec<String>,
    pub deep_dive: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub title: String,
    pub image_prompt: String,
    /// Empty when no image has been generated for this slide yet.
    #[serde(rename = "imageUrl", default)]
    pub image_url: String,
    pub content: SlideContent,
}

/// A multiple-choice question. Valid only when it has exactly four options and
/// `correct_answer` matches one of them byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

impl QuizQuestion {
    pub fn is_valid(&self) -> bool {
        self.options.len() == QUIZ_OPTIONS && self.options.contains(&self.correct_answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseModule {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,
}

impl CourseModule {
    /// A module whose content could not be generated.
    pub fn empty(outline: &OutlineModule) -> Self {
        Self {
            title: outline.title.clone(),
            description: Some(outline.description.clone()).filter(|d| !d.is_empty()),
            slides: Vec::new(),
            quiz: Vec::new(),
        }
    }
}

/// A fully generated course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub prompt: String,
    pub depth: ContentDepth,
    pub cover: CourseCover,
    pub modules: Vec<CourseModule>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Every image position in the course, cover first, then slides in order.
    pub fn image_slots(&self) -> Vec<(ImageSlot, &str, &str)> {
        let mut slots = vec![(
            ImageSlot::Cover,
            self.cover.image_prompt.as_str(),
            self.cover.image_url.as_str(),
        )];
        for (m, module) in self.modules.iter().enumerate() {
            for (s, slide) in module.slides.iter().enumerate() {
                slots.push((
                    ImageSlot::Slide { module: m, slide: s },
                    slide.image_prompt.as_str(),
                    slide.image_url.as_str(),
                ));
            }
        }
        slots
    }

    /// Writes a resolved URL into the given slot. Returns false if the slot
    /// does not exist in this course.
    pub fn set_image_url(&mut self, slot: ImageSlot, url: String) -> bool {
        match slot {
            ImageSlot::Cover => {
                self.cover.image_url = url;
                true
            }
            ImageSlot::Slide { module, slide } => match self
                .modules
                .get_mut(module)
                .and_then(|m| m.slides.get_mut(slide))
            {
                Some(target) => {
                    target.image_url = url;
                    true
                }
                None => false,
            },
        }
    }
}

/// Where an image lives inside a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Cover,
    Slide { module: usize, slide: usize },
}

/// Destination of a generated image in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageKey {
    pub course_id: String,
    pub slot: ImageSlot,
}

impl ImageKey {
    pub fn new(course_id: impl Into<String>, slot: ImageSlot) -> Self {
        Self {
            course_id: course_id.into(),
            slot,
        }
    }

    /// The deterministic object key for this image.
    pub fn object_key(&self) -> String {
        match self.slot {
            ImageSlot::Cover => format!("courses/{}/cover.png", self.course_id),
            ImageSlot::Slide { module, slide } => format!(
                "courses/{}/module-{}-slide-{}.png",
                self.course_id, module, slide
            ),
        }
    }
}

//=========================================================================================
// Persistence Envelope
//=========================================================================================

/// A course as it is kept in the saved-course store, without id or timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCourseBody {
    pub prompt: String,
    pub depth: ContentDepth,
    pub cover: CourseCover,
    pub modules: Vec<CourseModule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCourse {
    pub id: i64,
    pub prompt: String,
    pub depth: ContentDepth,
    pub course: SavedCourseBody,
}

impl SavedCourse {
    pub fn from_course(id: i64, course: &Course) -> Self {
        Self {
            id,
            prompt: course.prompt.clone(),
            depth: course.depth,
            course: SavedCourseBody {
                prompt: course.prompt.clone(),
                depth: course.depth,
                cover: course.cover.clone(),
                modules: course.modules.clone(),
            },
        }
    }

    /// Rebuilds a viewable course. Timestamps are set to `now`.
    pub fn to_course(&self, now: DateTime<Utc>) -> Course {
        Course {
            id: self.id.to_string(),
            prompt: self.course.prompt.clone(),
            depth: self.course.depth,
            cover: self.course.cover.clone(),
            modules: self.course.modules.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user's result on one module's quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizScore {
    pub score: u32,
    pub total: u32,
}

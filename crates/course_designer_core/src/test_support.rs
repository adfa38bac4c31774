//! Fakes for the service ports, shared by the unit tests in this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::domain::{
    ContentDepth, CourseCover, CourseModule, QuizQuestion, SavedCourse, SavedCourseBody, Slide,
    SlideContent,
};
use crate::ports::{
    ImageModel, ImageStorageService, PortError, PortResult, StructuredRequest,
    TextGenerationService,
};

//=========================================================================================
// Text provider
//=========================================================================================

type Responder = dyn Fn(&StructuredRequest) -> PortResult<Value> + Send + Sync;
type Latency = dyn Fn(&StructuredRequest) -> Duration + Send + Sync;

/// A text provider whose answers are computed by a closure.
pub struct FakeText {
    responder: Box<Responder>,
    latency: Option<Box<Latency>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl FakeText {
    pub fn new(
        responder: impl Fn(&StructuredRequest) -> PortResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            latency: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers outline, cover and module requests with well-formed content.
    pub fn well_behaved() -> Self {
        Self::new(|request| Ok(well_formed_answer(request)))
    }

    /// Delays each answer by a per-request duration.
    pub fn with_latency(
        mut self,
        latency: impl Fn(&StructuredRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl TextGenerationService for FakeText {
    async fn generate_json(&self, request: &StructuredRequest) -> PortResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        match &self.latency {
            Some(latency) => tokio::time::sleep(latency(request)).await,
            // Let concurrently launched requests interleave.
            None => tokio::task::yield_now().await,
        }
        (self.responder)(request)
    }
}

/// Pulls the value following `label` out of a prompt, e.g. "exactly 2 modules".
pub fn number_after(prompt: &str, label: &str) -> Option<usize> {
    let start = prompt.find(label)? + label.len();
    prompt[start..]
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
}

pub fn well_formed_answer(request: &StructuredRequest) -> Value {
    match request.schema_name.as_str() {
        "course_outline" => {
            let n = number_after(&request.prompt, "exactly").unwrap_or(1);
            let modules: Vec<Value> = (0..n)
                .map(|i| json!({"title": format!("Module {}", i + 1), "description": "About it."}))
                .collect();
            json!({ "modules": modules })
        }
        "course_cover" => json!({"cover": {"image_prompt": "A bright cover"}}),
        _ => module_json(),
    }
}

pub fn module_json() -> Value {
    let slides: Vec<Value> = (0..3)
        .map(|i| {
            json!({
                "title": format!("Slide {}", i + 1),
                "image_prompt": format!("Picture {}", i + 1),
                "content": {
                    "summary": "Summary.",
                    "details": ["One.", "Two."],
                    "deep_dive": ["Deep."]
                }
            })
        })
        .collect();
    let quiz: Vec<Value> = (0..3)
        .map(|i| {
            json!({
                "question": format!("Question {}?", i + 1),
                "options": ["A", "B", "C", "D"],
                "correct_answer": "B"
            })
        })
        .collect();
    json!({ "slides": slides, "quiz": quiz })
}

//=========================================================================================
// Image models and storage
//=========================================================================================

#[derive(Debug, Clone, Copy)]
pub enum ModelBehavior {
    Succeed,
    Unavailable,
    Fail,
    Hang,
}

pub struct FakeImageModel {
    name: String,
    behavior: ModelBehavior,
    failing: HashSet<String>,
    succeeding: HashSet<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeImageModel {
    pub fn new(name: &str, behavior: ModelBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            failing: HashSet::new(),
            succeeding: HashSet::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Makes this prompt fail with a non-recoverable error.
    pub fn failing_on(mut self, prompt: &str) -> Self {
        self.failing.insert(prompt.to_string());
        self
    }

    /// Makes this prompt succeed regardless of the default behavior.
    pub fn succeeding_on(mut self, prompt: &str) -> Self {
        self.succeeding.insert(prompt.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn url_for(&self, prompt: &str) -> String {
        format!("https://img.test/{}/{}", self.name, prompt.replace(' ', "%20"))
    }
}

#[async_trait]
impl ImageModel for FakeImageModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, prompt: &str) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let behavior = if self.succeeding.contains(prompt) {
            ModelBehavior::Succeed
        } else if self.failing.contains(prompt) {
            ModelBehavior::Fail
        } else {
            self.behavior
        };

        let result = match behavior {
            ModelBehavior::Succeed => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(self.url_for(prompt))
            }
            ModelBehavior::Unavailable => Err(PortError::ModelUnavailable(format!(
                "{} does not exist",
                self.name
            ))),
            ModelBehavior::Fail => Err(PortError::Generation("content policy".to_string())),
            ModelBehavior::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Object storage that records every key and fails for the chosen ones.
#[derive(Default)]
pub struct FakeStorage {
    failing: HashSet<String>,
    keys: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn failing_for(key: &str) -> Self {
        Self {
            failing: HashSet::from([key.to_string()]),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        self.keys.lock().await.clone()
    }
}

#[async_trait]
impl ImageStorageService for FakeStorage {
    async fn persist_image(&self, _source_url: &str, object_key: &str) -> PortResult<String> {
        self.keys.lock().await.push(object_key.to_string());
        if self.failing.contains(object_key) {
            return Err(PortError::Storage("access denied".to_string()));
        }
        Ok(format!("https://bucket.test/{}", object_key))
    }
}

//=========================================================================================
// Fixtures
//=========================================================================================

pub fn slide(title: &str, image_url: &str) -> Slide {
    Slide {
        title: title.to_string(),
        image_prompt: format!("Picture of {}", title),
        image_url: image_url.to_string(),
        content: SlideContent {
            summary: "Summary.".to_string(),
            details: vec!["One.".to_string()],
            deep_dive: vec![],
        },
    }
}

pub fn saved_course(id: i64, prompt: &str) -> SavedCourse {
    saved_course_with_images(id, prompt, "https://img.test/cover", &["https://img.test/s1"])
}

pub fn saved_course_with_images(
    id: i64,
    prompt: &str,
    cover_url: &str,
    slide_urls: &[&str],
) -> SavedCourse {
    let slides = slide_urls
        .iter()
        .enumerate()
        .map(|(i, url)| slide(&format!("Slide {}", i + 1), url))
        .collect();
    SavedCourse {
        id,
        prompt: prompt.to_string(),
        depth: ContentDepth::Low,
        course: SavedCourseBody {
            prompt: prompt.to_string(),
            depth: ContentDepth::Low,
            cover: CourseCover {
                image_prompt: "Cover".to_string(),
                image_url: cover_url.to_string(),
            },
            modules: vec![CourseModule {
                title: "Module 1".to_string(),
                description: None,
                slides,
                quiz: vec![QuizQuestion {
                    question: "Q?".to_string(),
                    options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                    correct_answer: "A".to_string(),
                }],
            }],
        },
    }
}

//! crates/course_designer_core/src/state.rs
//!
//! The per-session state machine. A session moves through
//! `Prompt -> GeneratingCourse -> OutlineReview -> GeneratingCourse -> CourseView`
//! and back to `Prompt` on reset. An error flag can be raised in any stage;
//! while it is set, only `Retry` or `Reset` may change the stage.
//!
//! All mutation goes through [`SessionState::apply`], which keeps the
//! invariant that a course is present exactly when the stage is `CourseView`.
//!
//! Every request that starts provider work, and every reset, advances the
//! session's request epoch. Provider results carry the epoch they were started
//! under and are rejected once it has moved on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ContentDepth, Course, OutlineModule, QuizScore, SavedCourse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CourseStage {
    #[default]
    Prompt,
    OutlineReview,
    GeneratingCourse,
    CourseView,
}

/// Whether a module is showing its slides or its quiz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Slide,
    Quiz,
}

/// The named actions a session accepts.
#[derive(Debug, Clone)]
pub enum SessionAction {
    SubmitOutlineRequest { prompt: String, depth: ContentDepth },
    OutlineReceived {
        epoch: u64,
        outline: Vec<OutlineModule>,
    },
    ApproveOutline,
    CourseReceived {
        epoch: u64,
        course: Course,
    },
    /// Opens a previously saved course from any stage.
    CourseLoaded {
        epoch: u64,
        prompt: String,
        depth: ContentDepth,
        course: Course,
    },
    Fail(String),
    Retry,
    Reset,
    SetLoading(bool),
    SetProgress { progress: f32, message: String },
    UpdateQuizScore { module_index: usize, score: QuizScore },
    SetCurrentSlide { module_index: usize, slide_index: usize },
    SetViewMode { module_index: usize, mode: ViewMode },
    SetContentDepth(ContentDepth),
    LoadSavedCourses(Vec<SavedCourse>),
}

impl SessionAction {
    pub fn name(&self) -> &'static str {
        match self {
            SessionAction::SubmitOutlineRequest { .. } => "submit an outline request",
            SessionAction::OutlineReceived { .. } => "receive an outline",
            SessionAction::ApproveOutline => "approve the outline",
            SessionAction::CourseReceived { .. } => "receive a course",
            SessionAction::CourseLoaded { .. } => "open a saved course",
            SessionAction::Fail(_) => "record an error",
            SessionAction::Retry => "retry",
            SessionAction::Reset => "reset",
            SessionAction::SetLoading(_) => "set loading",
            SessionAction::SetProgress { .. } => "set progress",
            SessionAction::UpdateQuizScore { .. } => "update a quiz score",
            SessionAction::SetCurrentSlide { .. } => "change slide",
            SessionAction::SetViewMode { .. } => "change view mode",
            SessionAction::SetContentDepth(_) => "set content depth",
            SessionAction::LoadSavedCourses(_) => "load saved courses",
        }
    }

    fn changes_stage(&self) -> bool {
        matches!(
            self,
            SessionAction::SubmitOutlineRequest { .. }
                | SessionAction::OutlineReceived { .. }
                | SessionAction::ApproveOutline
                | SessionAction::CourseReceived { .. }
                | SessionAction::CourseLoaded { .. }
        )
    }

    /// The epoch a provider result was started under, if this is one.
    fn result_epoch(&self) -> Option<u64> {
        match self {
            SessionAction::OutlineReceived { epoch, .. }
            | SessionAction::CourseReceived { epoch, .. }
            | SessionAction::CourseLoaded { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} in the {stage:?} stage")]
    InvalidStage {
        action: &'static str,
        stage: CourseStage,
    },
    #[error("cannot {action} until the current error is cleared")]
    ErrorPending { action: &'static str },
    #[error("there is no outline to approve")]
    MissingOutline,
    #[error("module {0} does not exist in the current course")]
    UnknownModule(usize),
    #[error("cannot {action}: the session has moved on to a newer request")]
    Stale { action: &'static str },
}

/// Everything a user session knows about its course in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    current_stage: CourseStage,
    user_prompt: String,
    content_depth: ContentDepth,
    course_outline: Option<Vec<OutlineModule>>,
    full_course: Option<Course>,
    quiz_scores: BTreeMap<usize, QuizScore>,
    current_slide: BTreeMap<usize, usize>,
    view_mode: BTreeMap<usize, ViewMode>,
    saved_courses: Vec<SavedCourse>,
    loading: bool,
    error: Option<String>,
    progress: f32,
    progress_message: String,
    request_epoch: u64,
}

impl SessionState {
    pub fn new(saved_courses: Vec<SavedCourse>) -> Self {
        Self {
            saved_courses,
            ..Self::default()
        }
    }

    /// Applies one action. On error the state is left untouched.
    pub fn apply(&mut self, action: SessionAction) -> Result<(), TransitionError> {
        let name = action.name();
        if action.result_epoch().is_some_and(|epoch| epoch != self.request_epoch) {
            return Err(TransitionError::Stale { action: name });
        }
        if self.error.is_some() && action.changes_stage() {
            return Err(TransitionError::ErrorPending { action: name });
        }

        match action {
            SessionAction::SubmitOutlineRequest { prompt, depth } => {
                self.expect_stage(name, CourseStage::Prompt)?;
                self.user_prompt = prompt;
                self.content_depth = depth;
                self.course_outline = None;
                self.current_stage = CourseStage::GeneratingCourse;
                self.loading = true;
                self.request_epoch += 1;
            }
            SessionAction::OutlineReceived { outline, .. } => {
                self.expect_stage(name, CourseStage::GeneratingCourse)?;
                if self.course_outline.is_some() {
                    return Err(self.invalid(name));
                }
                self.course_outline = Some(outline);
                self.current_stage = CourseStage::OutlineReview;
                self.loading = false;
            }
            SessionAction::ApproveOutline => {
                self.expect_stage(name, CourseStage::OutlineReview)?;
                if self.course_outline.as_ref().map_or(true, Vec::is_empty) {
                    return Err(TransitionError::MissingOutline);
                }
                self.current_stage = CourseStage::GeneratingCourse;
                self.loading = true;
                self.progress = 0.0;
                self.progress_message.clear();
                self.request_epoch += 1;
            }
            SessionAction::CourseReceived { course, .. } => {
                self.expect_stage(name, CourseStage::GeneratingCourse)?;
                if self.course_outline.is_none() {
                    return Err(self.invalid(name));
                }
                self.enter_course_view(course);
            }
            SessionAction::CourseLoaded {
                prompt,
                depth,
                course,
                ..
            } => {
                self.user_prompt = prompt;
                self.content_depth = depth;
                self.course_outline = None;
                self.enter_course_view(course);
                self.request_epoch += 1;
            }
            SessionAction::Fail(message) => {
                self.error = Some(message);
                self.loading = false;
            }
            SessionAction::Retry | SessionAction::Reset => {
                let saved_courses = std::mem::take(&mut self.saved_courses);
                let epoch = self.request_epoch + 1;
                *self = Self::new(saved_courses);
                self.request_epoch = epoch;
            }
            SessionAction::SetLoading(loading) => self.loading = loading,
            SessionAction::SetProgress { progress, message } => {
                self.progress = progress.clamp(0.0, 100.0);
                self.progress_message = message;
            }
            SessionAction::UpdateQuizScore {
                module_index,
                score,
            } => {
                self.expect_module(module_index)?;
                self.quiz_scores.insert(module_index, score);
            }
            SessionAction::SetCurrentSlide {
                module_index,
                slide_index,
            } => {
                self.expect_module(module_index)?;
                self.current_slide.insert(module_index, slide_index);
            }
            SessionAction::SetViewMode { module_index, mode } => {
                self.expect_module(module_index)?;
                self.view_mode.insert(module_index, mode);
            }
            SessionAction::SetContentDepth(depth) => self.content_depth = depth,
            SessionAction::LoadSavedCourses(courses) => self.saved_courses = courses,
        }
        Ok(())
    }

    fn enter_course_view(&mut self, course: Course) {
        let modules = course.modules.len();
        self.current_slide = (0..modules).map(|i| (i, 0)).collect();
        self.view_mode = (0..modules).map(|i| (i, ViewMode::Slide)).collect();
        self.quiz_scores.clear();
        self.full_course = Some(course);
        self.current_stage = CourseStage::CourseView;
        self.loading = false;
    }

    fn expect_stage(&self, action: &'static str, stage: CourseStage) -> Result<(), TransitionError> {
        if self.current_stage == stage {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::InvalidStage {
            action,
            stage: self.current_stage,
        }
    }

    fn expect_module(&self, index: usize) -> Result<(), TransitionError> {
        match &self.full_course {
            Some(course) if index < course.modules.len() => Ok(()),
            _ => Err(TransitionError::UnknownModule(index)),
        }
    }

    /// The stage a view should render. Falls back to `Prompt` when the state was
    /// restored from somewhere that broke the course/stage pairing.
    pub fn effective_stage(&self) -> CourseStage {
        if self.invariant_holds() {
            self.current_stage
        } else {
            CourseStage::Prompt
        }
    }

    pub fn invariant_holds(&self) -> bool {
        self.full_course.is_some() == (self.current_stage == CourseStage::CourseView)
    }

    /// Identifies the request currently allowed to deliver results.
    pub fn epoch(&self) -> u64 {
        self.request_epoch
    }

    pub fn stage(&self) -> CourseStage {
        self.current_stage
    }

    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }

    pub fn content_depth(&self) -> ContentDepth {
        self.content_depth
    }

    pub fn outline(&self) -> Option<&[OutlineModule]> {
        self.course_outline.as_deref()
    }

    pub fn course(&self) -> Option<&Course> {
        self.full_course.as_ref()
    }

    pub fn quiz_score(&self, module_index: usize) -> Option<QuizScore> {
        self.quiz_scores.get(&module_index).copied()
    }

    pub fn current_slide(&self, module_index: usize) -> usize {
        self.current_slide.get(&module_index).copied().unwrap_or(0)
    }

    pub fn view_mode(&self, module_index: usize) -> ViewMode {
        self.view_mode.get(&module_index).copied().unwrap_or_default()
    }

    pub fn saved_courses(&self) -> &[SavedCourse] {
        &self.saved_courses
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn progress_message(&self) -> &str {
        &self.progress_message
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::test_support::saved_course;

    fn outline() -> Vec<OutlineModule> {
        vec![
            OutlineModule {
                title: "One".into(),
                description: "first".into(),
            },
            OutlineModule {
                title: "Two".into(),
                description: "second".into(),
            },
        ]
    }

    fn course() -> Course {
        saved_course(7, "Intro to X").to_course(Utc::now())
    }

    fn submit(state: &mut SessionState) {
        state
            .apply(SessionAction::SubmitOutlineRequest {
                prompt: "Intro to X".into(),
                depth: ContentDepth::Medium,
            })
            .unwrap();
    }

    #[test]
    fn full_cycle_keeps_course_iff_course_view() {
        let mut state = SessionState::new(vec![saved_course(1, "old")]);
        assert!(state.invariant_holds());
        assert_eq!(state.stage(), CourseStage::Prompt);

        submit(&mut state);
        assert_eq!(state.stage(), CourseStage::GeneratingCourse);
        assert!(state.is_loading());
        assert!(state.invariant_holds());

        state
            .apply(SessionAction::OutlineReceived {
                epoch: state.epoch(),
                outline: outline(),
            })
            .unwrap();
        assert_eq!(state.stage(), CourseStage::OutlineReview);
        assert!(!state.is_loading());
        assert!(state.invariant_holds());

        state.apply(SessionAction::ApproveOutline).unwrap();
        assert_eq!(state.stage(), CourseStage::GeneratingCourse);
        assert!(state.course().is_none());

        state
            .apply(SessionAction::CourseReceived {
                epoch: state.epoch(),
                course: course(),
            })
            .unwrap();
        assert_eq!(state.stage(), CourseStage::CourseView);
        assert!(state.course().is_some());
        assert!(state.invariant_holds());
        assert_eq!(state.current_slide(0), 0);
        assert_eq!(state.view_mode(0), ViewMode::Slide);

        state.apply(SessionAction::Reset).unwrap();
        assert_eq!(state.stage(), CourseStage::Prompt);
        assert!(state.course().is_none());
        assert!(state.outline().is_none());
        assert_eq!(state.user_prompt(), "");
        assert_eq!(state.saved_courses().len(), 1);
        assert!(state.invariant_holds());
    }

    #[test]
    fn error_blocks_stage_changes_until_retry() {
        let mut state = SessionState::default();
        submit(&mut state);
        state
            .apply(SessionAction::Fail("Failed to generate outline".into()))
            .unwrap();
        assert_eq!(state.error(), Some("Failed to generate outline"));
        assert_eq!(state.stage(), CourseStage::GeneratingCourse);
        assert!(!state.is_loading());

        let before = state.clone();
        let err = state
            .apply(SessionAction::OutlineReceived {
                epoch: state.epoch(),
                outline: outline(),
            })
            .unwrap_err();
        assert!(matches!(err, TransitionError::ErrorPending { .. }));
        assert_eq!(state, before);

        // Side-channel updates are still accepted.
        state
            .apply(SessionAction::SetProgress {
                progress: 10.0,
                message: "still here".into(),
            })
            .unwrap();
        assert_eq!(state.stage(), CourseStage::GeneratingCourse);

        state.apply(SessionAction::Retry).unwrap();
        assert_eq!(state.error(), None);
        assert_eq!(state.stage(), CourseStage::Prompt);
        submit(&mut state);
    }

    #[test]
    fn out_of_order_actions_are_rejected() {
        let mut state = SessionState::default();
        assert!(matches!(
            state.apply(SessionAction::ApproveOutline),
            Err(TransitionError::InvalidStage { .. })
        ));
        assert!(matches!(
            state.apply(SessionAction::CourseReceived {
                epoch: state.epoch(),
                course: course(),
            }),
            Err(TransitionError::InvalidStage { .. })
        ));

        submit(&mut state);
        // The outline has not arrived yet, so a course cannot either.
        assert!(state
            .apply(SessionAction::CourseReceived {
                epoch: state.epoch(),
                course: course(),
            })
            .is_err());

        state
            .apply(SessionAction::OutlineReceived {
                epoch: state.epoch(),
                outline: vec![],
            })
            .unwrap();
        assert_eq!(
            state.apply(SessionAction::ApproveOutline),
            Err(TransitionError::MissingOutline)
        );
        assert!(state.invariant_holds());
    }

    #[test]
    fn results_from_an_abandoned_request_are_rejected() {
        let mut state = SessionState::default();
        submit(&mut state);
        let abandoned = state.epoch();

        state.apply(SessionAction::Reset).unwrap();
        state
            .apply(SessionAction::SubmitOutlineRequest {
                prompt: "New topic".into(),
                depth: ContentDepth::Low,
            })
            .unwrap();
        assert!(state.epoch() > abandoned);

        let before = state.clone();
        assert_eq!(
            state.apply(SessionAction::OutlineReceived {
                epoch: abandoned,
                outline: outline(),
            }),
            Err(TransitionError::Stale {
                action: "receive an outline"
            })
        );
        assert_eq!(state, before);

        state
            .apply(SessionAction::OutlineReceived {
                epoch: state.epoch(),
                outline: outline(),
            })
            .unwrap();
        assert_eq!(state.stage(), CourseStage::OutlineReview);
        assert_eq!(state.user_prompt(), "New topic");

        // Approving starts a new request; the outline-stage epoch no longer delivers.
        let outline_epoch = state.epoch();
        state.apply(SessionAction::ApproveOutline).unwrap();
        assert!(matches!(
            state.apply(SessionAction::CourseReceived {
                epoch: outline_epoch,
                course: course(),
            }),
            Err(TransitionError::Stale { .. })
        ));
        assert_eq!(state.stage(), CourseStage::GeneratingCourse);
    }

    #[test]
    fn side_channel_updates_do_not_change_stage() {
        let mut state = SessionState::default();
        state
            .apply(SessionAction::CourseLoaded {
                epoch: state.epoch(),
                prompt: "p".into(),
                depth: ContentDepth::High,
                course: course(),
            })
            .unwrap();
        assert_eq!(state.stage(), CourseStage::CourseView);
        assert_eq!(state.content_depth(), ContentDepth::High);

        let score = QuizScore { score: 2, total: 3 };
        state
            .apply(SessionAction::UpdateQuizScore {
                module_index: 0,
                score,
            })
            .unwrap();
        state
            .apply(SessionAction::SetCurrentSlide {
                module_index: 0,
                slide_index: 1,
            })
            .unwrap();
        state
            .apply(SessionAction::SetViewMode {
                module_index: 0,
                mode: ViewMode::Quiz,
            })
            .unwrap();
        state
            .apply(SessionAction::SetProgress {
                progress: 250.0,
                message: "done".into(),
            })
            .unwrap();

        assert_eq!(state.stage(), CourseStage::CourseView);
        assert_eq!(state.quiz_score(0), Some(score));
        assert_eq!(state.current_slide(0), 1);
        assert_eq!(state.view_mode(0), ViewMode::Quiz);
        assert_eq!(state.progress(), 100.0);

        assert_eq!(
            state.apply(SessionAction::SetCurrentSlide {
                module_index: 5,
                slide_index: 0
            }),
            Err(TransitionError::UnknownModule(5))
        );
    }

    #[test]
    fn corrupted_snapshot_falls_back_to_prompt() {
        let mut value = serde_json::to_value(SessionState::default()).unwrap();
        value["currentStage"] = serde_json::json!("courseView");
        let state: SessionState = serde_json::from_value(value).unwrap();

        assert!(!state.invariant_holds());
        assert_eq!(state.effective_stage(), CourseStage::Prompt);
    }
}

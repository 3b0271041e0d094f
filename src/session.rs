//! One learner connection: owns the practice and exam controllers, the
//! running countdown and any in-flight content request.
//!
//! Everything that can change controller state arrives as either a client
//! message or a `SessionEvent` (tick, finished load), and the WebSocket loop
//! hands them to the session one at a time. Spawned work only ever reports
//! back through the event channel, tagged with the ticket or token it was
//! started for.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::countdown::Countdown;
use crate::domain::{ExamSettings, Level, Question, Skill};
use crate::error::AppError;
use crate::exam::{ExamController, LoadRequest, LoadTicket, TickOutcome, TickToken};
use crate::logic;
use crate::practice::PracticeController;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[derive(Debug)]
pub enum SessionEvent {
  Tick(TickToken),
  ExerciseLoaded(LoadTicket, Result<Question, AppError>),
  BatchLoaded(LoadTicket, Result<Vec<Question>, AppError>),
}

pub struct Session {
  id: Uuid,
  state: Arc<AppState>,
  events: mpsc::UnboundedSender<SessionEvent>,
  practice: Option<PracticeController>,
  practice_load: Option<JoinHandle<()>>,
  exam: Option<ExamController>,
  exam_load: Option<JoinHandle<()>>,
  countdown: Option<Countdown>,
}

fn error_reply(err: &AppError) -> Vec<ServerWsMessage> {
  vec![ServerWsMessage::from(err)]
}

fn no_controller(what: &str) -> Vec<ServerWsMessage> {
  error_reply(&AppError::InvalidInput(format!("no {what} is open")))
}

impl Session {
  pub fn new(state: Arc<AppState>) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
    let (events, rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    debug!(target: "practica_valencia", session = %id, "Session created");
    let session = Self {
      id,
      state,
      events,
      practice: None,
      practice_load: None,
      exam: None,
      exam_load: None,
      countdown: None,
    };
    (session, rx)
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub async fn handle_client(&mut self, msg: ClientWsMessage) -> Vec<ServerWsMessage> {
    match msg {
      ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

      ClientWsMessage::PracticeStart { level, skill } => {
        let (ctl, ticket) = PracticeController::start(level, skill);
        self.practice = Some(ctl);
        self.spawn_exercise_load(ticket, level, skill);
        self.practice_view()
      }

      ClientWsMessage::PracticeAnswer { option } => self.practice_answer(&option).await,

      ClientWsMessage::PracticeNext => {
        let Some(ctl) = self.practice.as_mut() else { return no_controller("practice") };
        if let Some(ticket) = ctl.next() {
          let (level, skill) = (ctl.level(), ctl.skill());
          self.spawn_exercise_load(ticket, level, skill);
        }
        self.practice_view()
      }

      ClientWsMessage::ExamOpen { level } => {
        let settings = self.state.prefs.read().await.exam_settings();
        self.replace_exam(ExamController::exam(level, settings));
        info!(target: "exam", session = %self.id, %level, "Exam opened");
        self.exam_changed().await
      }

      ClientWsMessage::ExamSettings { num_questions, time_per_question } => {
        let settings = ExamSettings { num_questions, time_per_question };
        let Some(ctl) = self.exam.as_mut() else { return no_controller("exam") };
        if let Err(e) = ctl.set_settings(settings) {
          return error_reply(&e);
        }
        if let Err(e) = logic::save_exam_settings(&self.state, settings).await {
          return error_reply(&e);
        }
        self.exam_changed().await
      }

      ClientWsMessage::ExamBegin | ClientWsMessage::PlacementRetry => {
        let Some(ctl) = self.exam.as_mut() else { return no_controller("exam") };
        if let Some(ticket) = ctl.begin() {
          let request = ctl.load_request();
          self.spawn_batch_load(ticket, request);
        }
        self.exam_changed().await
      }

      ClientWsMessage::PlacementStart => {
        let (ctl, ticket) = ExamController::placement();
        self.replace_exam(ctl);
        self.spawn_batch_load(ticket, LoadRequest::Placement);
        info!(target: "exam", session = %self.id, "Placement test started");
        self.exam_changed().await
      }

      ClientWsMessage::ExamSelect { option } | ClientWsMessage::PlacementSelect { option } => {
        let Some(ctl) = self.exam.as_mut() else { return no_controller("exam") };
        if let Err(e) = ctl.select(&option) {
          return error_reply(&e);
        }
        self.exam_changed().await
      }

      ClientWsMessage::ExamNext | ClientWsMessage::PlacementNext => {
        let Some(ctl) = self.exam.as_mut() else { return no_controller("exam") };
        if ctl.next() == TickOutcome::Ignored {
          debug!(target: "exam", session = %self.id, "next refused: no answer recorded");
        }
        self.exam_changed().await
      }

      ClientWsMessage::ExamReview => {
        let Some(ctl) = self.exam.as_mut() else { return no_controller("exam") };
        ctl.start_review();
        self.exam_changed().await
      }

      ClientWsMessage::ExamReviewSelect { option } => {
        let Some(ctl) = self.exam.as_mut() else { return no_controller("exam") };
        if let Err(e) = ctl.review_select(&option) {
          return error_reply(&e);
        }
        self.exam_changed().await
      }

      ClientWsMessage::ExamReviewNext => {
        let Some(ctl) = self.exam.as_mut() else { return no_controller("exam") };
        ctl.review_next();
        self.exam_changed().await
      }

      ClientWsMessage::CloseController => {
        self.close_practice();
        self.close_exam();
        vec![]
      }
    }
  }

  pub async fn handle_event(&mut self, event: SessionEvent) -> Vec<ServerWsMessage> {
    match event {
      SessionEvent::Tick(token) => {
        let Some(ctl) = self.exam.as_mut() else { return vec![] };
        match ctl.tick(token) {
          TickOutcome::Ignored => {
            debug!(target: "exam", session = %self.id, "Stale tick ignored");
            vec![]
          }
          TickOutcome::Counting(remaining) => vec![ServerWsMessage::Tick { remaining }],
          TickOutcome::Advanced | TickOutcome::Finished => self.exam_changed().await,
        }
      }

      SessionEvent::ExerciseLoaded(ticket, result) => {
        let Some(ctl) = self.practice.as_mut() else { return vec![] };
        if ctl.install(ticket, result) {
          self.practice_view()
        } else {
          vec![]
        }
      }

      SessionEvent::BatchLoaded(ticket, result) => {
        let Some(ctl) = self.exam.as_mut() else { return vec![] };
        if ctl.install(ticket, result) {
          self.exam_changed().await
        } else {
          vec![]
        }
      }
    }
  }

  async fn practice_answer(&mut self, option: &str) -> Vec<ServerWsMessage> {
    let Some(ctl) = self.practice.as_mut() else { return no_controller("practice") };
    let answered = match ctl.answer(option) {
      Ok(Some(a)) => a,
      Ok(None) => return self.practice_view(),
      Err(e) => return error_reply(&e),
    };
    let (_, milestone) =
      logic::record_answer(&self.state, answered.level, answered.exercise, answered.selected).await;
    let mut out = self.practice_view();
    out.extend(milestone.map(ServerWsMessage::from));
    out
  }

  fn practice_view(&self) -> Vec<ServerWsMessage> {
    match &self.practice {
      Some(ctl) => vec![ServerWsMessage::Practice { practice: ctl.view() }],
      None => vec![],
    }
  }

  /// Re-align the countdown with the controller, persist a fresh placement
  /// recommendation, and render the exam view.
  async fn exam_changed(&mut self) -> Vec<ServerWsMessage> {
    self.sync_countdown();
    let Some(ctl) = self.exam.as_mut() else { return vec![] };
    if let Some(level) = ctl.take_recommendation() {
      logic::save_recommendation(&self.state, level).await;
    }
    vec![ServerWsMessage::Exam { exam: ctl.view() }]
  }

  /// Keep exactly one countdown running, for the current position only.
  fn sync_countdown(&mut self) {
    let wanted = self.exam.as_ref().and_then(ExamController::tick_token);
    let running = self.countdown.as_ref().map(Countdown::token);
    if wanted == running {
      return;
    }
    // Dropping the old countdown aborts its task.
    self.countdown = wanted.map(|token| Countdown::start(token, self.events.clone()));
  }

  fn replace_exam(&mut self, ctl: ExamController) {
    self.close_exam();
    self.exam = Some(ctl);
  }

  fn close_exam(&mut self) {
    if let Some(h) = self.exam_load.take() {
      h.abort();
    }
    self.exam = None;
    self.countdown = None;
  }

  fn close_practice(&mut self) {
    if let Some(h) = self.practice_load.take() {
      h.abort();
    }
    self.practice = None;
  }

  fn spawn_exercise_load(&mut self, ticket: LoadTicket, level: Level, skill: Skill) {
    let state = self.state.clone();
    let events = self.events.clone();
    let handle = tokio::spawn(async move {
      let result = logic::next_exercise(&state, level, skill).await;
      let _ = events.send(SessionEvent::ExerciseLoaded(ticket, result));
    });
    if let Some(old) = self.practice_load.replace(handle) {
      old.abort();
    }
  }

  fn spawn_batch_load(&mut self, ticket: LoadTicket, request: LoadRequest) {
    let state = self.state.clone();
    let events = self.events.clone();
    let handle = tokio::spawn(async move {
      let result = match request {
        LoadRequest::Exam { level, num_questions } => state.content.fetch_exam(level, num_questions).await,
        LoadRequest::Placement => state.content.fetch_placement_test().await,
      };
      let _ = events.send(SessionEvent::BatchLoaded(ticket, result));
    });
    if let Some(old) = self.exam_load.replace(handle) {
      old.abort();
    }
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    self.close_practice();
    self.close_exam();
    debug!(target: "practica_valencia", session = %self.id, "Session closed");
  }
}

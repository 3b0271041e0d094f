//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions and request a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Level, Question, Skill};
use crate::util::{fill_template, trunc_for_log};

/// Number of items in a placement test.
pub const PLACEMENT_QUESTIONS: usize = 10;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

#[derive(Deserialize)]
struct QuestionList {
  questions: Vec<Question>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model =
      std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "practica-valencia/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    debug!(response_len = text.len(), preview = %trunc_for_log(&text, 120), "OpenAI response body");

    serde_json::from_str::<T>(text.trim()).map_err(|e| format!("JSON parse error: {}", e))
  }

  // --- High-level helpers (domain-specialized) ---

  /// One practice exercise for a level and skill, avoiding recently seen sentences.
  #[instrument(level = "info", skip_all, fields(%level, skill = skill.label(), recent = recent.len()))]
  pub async fn generate_exercise(
    &self,
    prompts: &Prompts,
    level: Level,
    skill: Skill,
    recent: &[String],
  ) -> Result<Question, String> {
    let user = exercise_prompt(prompts, level, skill, recent);
    let start = Instant::now();
    let result = self.chat_json::<Question>(&prompts.system, &user, 0.9).await;
    log_elapsed(start, &result, "exercise");
    let q = result?;
    q.validate().map_err(|e| format!("invalid exercise: {e}"))?;
    Ok(q)
  }

  /// A batch of `num_questions` fill-in-the-blank items at one level.
  #[instrument(level = "info", skip_all, fields(%level, num_questions = num_questions))]
  pub async fn generate_exam(
    &self,
    prompts: &Prompts,
    level: Level,
    num_questions: usize,
  ) -> Result<Vec<Question>, String> {
    let n = num_questions.to_string();
    let user = fill_template(
      &prompts.exam_user_template,
      &[("level", level.as_str()), ("num_questions", &n)],
    );
    let start = Instant::now();
    let result = self.chat_json::<QuestionList>(&prompts.system, &user, 0.8).await;
    log_elapsed(start, &result, "exam");
    let list = result?;
    if list.questions.len() != num_questions {
      return Err(format!(
        "expected {} questions, got {}",
        num_questions,
        list.questions.len()
      ));
    }
    validate_all(&list.questions)?;
    Ok(list.questions)
  }

  /// The fixed, difficulty-graded placement test.
  #[instrument(level = "info", skip_all)]
  pub async fn generate_placement(&self, prompts: &Prompts) -> Result<Vec<Question>, String> {
    let start = Instant::now();
    let result = self
      .chat_json::<QuestionList>(&prompts.system, &prompts.placement_user_template, 0.7)
      .await;
    log_elapsed(start, &result, "placement");
    let mut questions = result?.questions;
    if questions.len() < PLACEMENT_QUESTIONS {
      return Err(format!(
        "expected {} questions, got {}",
        PLACEMENT_QUESTIONS,
        questions.len()
      ));
    }
    questions.truncate(PLACEMENT_QUESTIONS);
    validate_all(&questions)?;
    Ok(questions)
  }
}

/// Build the user message for a single exercise.
pub fn exercise_prompt(prompts: &Prompts, level: Level, skill: Skill, recent: &[String]) -> String {
  let recent_block = if recent.is_empty() {
    String::new()
  } else {
    let sentences = recent
      .iter()
      .map(|s| format!("- \"{}\"", s))
      .collect::<Vec<_>>()
      .join("\n");
    fill_template(&prompts.recent_template, &[("sentences", &sentences)])
  };
  fill_template(
    &prompts.exercise_user_template,
    &[
      ("level", level.as_str()),
      ("skill", skill.label()),
      ("skill_instruction", prompts.skill_instruction(skill)),
      ("recent", &recent_block),
    ],
  )
}

fn validate_all(questions: &[Question]) -> Result<(), String> {
  for (i, q) in questions.iter().enumerate() {
    q.validate().map_err(|e| format!("invalid question #{}: {}", i + 1, e))?;
  }
  Ok(())
}

fn log_elapsed<T>(start: Instant, result: &Result<T, String>, what: &str) {
  let elapsed = start.elapsed();
  match result {
    Ok(_) => info!(target: "content", ?elapsed, what, "Model response received successfully"),
    Err(e) => error!(target: "content", ?elapsed, what, error = %e, "Model call failed"),
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exercise_prompt_lists_recent_sentences() {
    let prompts = Prompts::default();
    let recent = vec!["Hui fa sol.".to_string(), "Demà plourà.".to_string()];
    let p = exercise_prompt(&prompts, Level::B2, Skill::LinguisticStructures, &recent);
    assert!(p.contains("B2"));
    assert!(p.contains("Estructures Lingüístiques"));
    assert!(p.contains("- \"Hui fa sol.\""));
    assert!(p.contains("- \"Demà plourà.\""));
    assert!(!p.contains("{recent}"));
  }

  #[test]
  fn test_exercise_prompt_without_history_has_no_variety_note() {
    let prompts = Prompts::default();
    let p = exercise_prompt(&prompts, Level::C1, Skill::Comprehension, &[]);
    assert!(!p.contains("recentment"));
    assert!(p.contains(prompts.skill_instruction(Skill::Comprehension)));
  }

  #[test]
  fn test_extract_openai_error() {
    let body = r#"{"error":{"message":"Invalid API key","type":"auth"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Invalid API key"));
    assert_eq!(extract_openai_error("not json"), None);
  }
}

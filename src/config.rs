//! Loading agent configuration (prompt overrides) from TOML, plus
//! resolution of the on-disk data directory.
//!
//! See `AgentConfig` and `Prompts` for expected schema.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Skill;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts used by the content source. Defaults target official Valencian
/// certificate exams (B1..C2). Any field can be overridden in TOML.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  /// Placeholders: {level}, {skill}, {skill_instruction}, {recent}
  pub exercise_user_template: String,
  /// Placeholder: {sentences}
  pub recent_template: String,
  /// Placeholders: {level}, {num_questions}
  pub exam_user_template: String,
  pub placement_user_template: String,

  pub comprehension_instruction: String,
  pub structures_instruction: String,
  pub written_instruction: String,
  pub oral_instruction: String,
}

impl Prompts {
  pub fn skill_instruction(&self, skill: Skill) -> &str {
    match skill {
      Skill::Comprehension => &self.comprehension_instruction,
      Skill::LinguisticStructures => &self.structures_instruction,
      Skill::WrittenExpression => &self.written_instruction,
      Skill::OralExpression => &self.oral_instruction,
    }
  }
}

const QUESTION_SHAPE: &str = "Cada pregunta és un objecte JSON {\"sentence\": string, \"options\": [4 strings diferents], \"correctAnswer\": string (idèntic a una de les opcions), \"explanation\": string}.";

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: format!(
        "Ets un expert en llengua valenciana i examinador oficial de la JQCV. Respon NOMÉS amb JSON estricte. {QUESTION_SHAPE}"
      ),
      exercise_user_template: "Genera una pregunta d'opció múltiple de nivell {level} de valencià per a l'àrea '{skill}'. {skill_instruction} Ha de ser natural, representativa del nivell i útil per a preparar un examen oficial. Retorna un únic objecte pregunta.{recent}".into(),
      recent_template: "\nL'usuari ja ha vist aquestes frases recentment; genera'n una de nova que no en siga una variació propera:\n{sentences}".into(),
      exam_user_template: "Genera un simulacre d'examen de nivell {level} amb exactament {num_questions} preguntes d'omplir el buit. Cada frase té un buit marcat com '[BLANK]'. Cobreix aspectes diferents de gramàtica i vocabulari del nivell {level}. Retorna {\"questions\": [..]} amb {num_questions} objectes pregunta.".into(),
      placement_user_template: "Genera un test de nivell de 10 preguntes d'omplir el buit (buit marcat com '[BLANK]') per a situar l'usuari entre B1, B2, C1 i C2. Dificultat progressiva: 2 preguntes B1, 3 B2, 3 C1 i 2 C2, en aquest ordre. Retorna {\"questions\": [..]} amb 10 objectes pregunta.".into(),
      comprehension_instruction: "Presenta un text curt (2-4 frases) seguit d'una pregunta sobre la informació o una inferència del text. El camp 'sentence' conté el text i la pregunta.".into(),
      structures_instruction: "Escriu una única frase amb un buit marcat com '[BLANK]'. Només una de les quatre opcions és correcta; l'explicació indica la regla aplicada.".into(),
      written_instruction: "Planteja una situació pràctica d'expressió escrita (inici d'una carta formal, connector adequat, registre) i pregunta quina opció és la més adient.".into(),
      oral_instruction: "Planteja una situació comunicativa oral (fórmula de cortesia, resposta en una entrevista) i pregunta quina expressió és la més adient.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "practica_valencia", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "practica_valencia", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "practica_valencia", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Directory holding persisted state: DATA_DIR if set, else the platform data dir.
pub fn data_dir_from_env() -> PathBuf {
  match std::env::var("DATA_DIR") {
    Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
    _ => dirs::data_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join("practica-valencia"),
  }
}

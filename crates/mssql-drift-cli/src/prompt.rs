//! Interactive confirmation before destructive work.

use dialoguer::Input;
use mssql_drift::{token_matches, Confirmer};
use tracing::warn;

/// Asks the operator to type the confirmation token.
pub struct TokenPrompt {
    token: String,
}

impl TokenPrompt {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

impl Confirmer for TokenPrompt {
    fn confirm(&mut self, prompt: &str) -> bool {
        eprintln!("\n{}.", prompt);
        let answer = Input::<String>::new()
            .with_prompt(format!("Type {} to continue", self.token))
            .allow_empty(true)
            .interact_text();
        match answer {
            Ok(input) => token_matches(&input, &self.token),
            Err(e) => {
                warn!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}

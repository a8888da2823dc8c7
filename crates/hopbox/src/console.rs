//! Interactive selection menu

use async_trait::async_trait;
use colored::Colorize;
use hopbox_jump::{JumpError, SelectionProvider};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Presents ambiguous choices as a numbered menu on the terminal.
pub struct ConsoleSelection;

#[async_trait]
impl SelectionProvider for ConsoleSelection {
    async fn choose(&self, prompt: &str, items: &[String]) -> hopbox_jump::Result<usize> {
        println!("{}", prompt.bold());
        for (index, item) in items.iter().enumerate() {
            println!("  {} {}", format!("{}.", index + 1).cyan(), item);
        }
        print!("{} ", format!("[1-{}]:", items.len()).dimmed());
        use std::io::Write;
        std::io::stdout().flush().map_err(JumpError::from)?;

        let mut line = String::new();
        let mut input = BufReader::new(tokio::io::stdin());
        input.read_line(&mut line).await.map_err(JumpError::from)?;

        let chosen: usize = line
            .trim()
            .parse()
            .map_err(|_| JumpError::InvalidSelection)?;
        if chosen == 0 || chosen > items.len() {
            return Err(JumpError::InvalidSelection);
        }
        Ok(chosen - 1)
    }
}

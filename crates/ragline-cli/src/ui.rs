//! UI utilities for the CLI

use colored::*;
use crossterm::terminal::size;
use std::io::{BufRead, Write};
use tracing::debug;

use ragline_core::Result;
use ragline_pipeline::Pipeline;

/// Shown before every question
pub const PROMPT: &str = "请输入你要问的问题，退出请输入(quit or q):";

/// Display startup banner
pub fn display_banner(dataset: &str, documents: usize, offline: bool) {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = terminal_width.saturating_sub(4).clamp(40, 67);
    let inner = banner_width - 2;

    let top_border = format!("┌{}┐", "─".repeat(inner));
    let bottom_border = format!("└{}┘", "─".repeat(inner));
    let empty_line = format!("│{}│", " ".repeat(inner));
    let padded = |text: &str| {
        let width = text.chars().count();
        format!("│  {}{}│", text, " ".repeat(inner.saturating_sub(width + 2)))
    };

    println!();
    println!("{}", top_border.blue());
    println!("{}", empty_line.blue());
    println!("{}", padded("Ragline - retrieval-augmented Q&A").blue().bold());
    println!("{}", empty_line.blue());

    let mode = if offline { "offline (local models)" } else { "online" };
    for line in [
        format!("Dataset:   {}", dataset),
        format!("Documents: {}", documents),
        format!("Mode:      {}", mode),
    ] {
        println!("{}", padded(&line).blue());
    }

    println!("{}", empty_line.blue());
    println!("{}", bottom_border.blue());
    println!();
    println!("{}", "Tip: type 'quit' or 'q' to exit".dimmed());
    println!();
}

/// Whether the line asks to leave the loop
pub fn is_exit(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("q")
}

/// Run one question through the pipeline and write the answer line
pub async fn answer<W: Write>(pipeline: &Pipeline, query: &str, output: &mut W) -> Result<bool> {
    match pipeline.invoke(query).await {
        Ok(answer) => {
            writeln!(output, "response: {}", answer)?;
            Ok(true)
        }
        Err(e) => {
            writeln!(output, "error: {}", e)?;
            Ok(false)
        }
    }
}

/// Read-eval loop: prompt, read a question, answer it, until an exit word
/// or end of input. Returns how many questions were answered.
pub async fn run_repl<R: BufRead, W: Write>(
    pipeline: &Pipeline,
    mut input: R,
    output: &mut W,
) -> Result<usize> {
    let mut answered = 0;

    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit(query) {
            debug!("exit requested");
            break;
        }

        if answer(pipeline, query, output).await? {
            answered += 1;
        }
    }

    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_words() {
        assert!(is_exit("quit"));
        assert!(is_exit("  Q \n"));
        assert!(is_exit("QUIT"));
        assert!(!is_exit("quite"));
        assert!(!is_exit(""));
    }
}

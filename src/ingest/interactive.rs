use std::io::{BufRead, Write};

use crate::ingest::IngestError;
use crate::knowledge::KnowledgeBase;

const PREVIEW_CHARS: usize = 100;

/// True for the words that end an interactive session
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    matches!(line, "Q!" | "q!")
        || ["退出", "exit", "quit"]
            .iter()
            .any(|word| line.eq_ignore_ascii_case(word))
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Prompt for questions on `input` and answer them on `output` until an exit
/// command or end of input.
pub async fn run_read_loop<R: BufRead, W: Write>(
    kb: &KnowledgeBase,
    welcome: &str,
    mut input: R,
    mut output: W,
) -> Result<(), IngestError> {
    writeln!(output, "\n===== {} =====", welcome)?;
    writeln!(output, "Enter '退出', 'exit', 'quit', 'Q!' or 'q!' to finish")?;

    let mut line = String::new();
    loop {
        write!(output, "\nYour question: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            break;
        }

        match kb.query_knowledge_base(question).await {
            Ok(result) => {
                writeln!(output, "\nAnswer: {}", result.answer)?;
                if !result.sources.is_empty() {
                    writeln!(output, "\nSources:")?;
                }
                for (i, source) in result.sources.iter().enumerate() {
                    let origin = source
                        .metadata
                        .get("source")
                        .map(String::as_str)
                        .unwrap_or("unknown source");
                    writeln!(output, "{}. {}", i + 1, origin)?;
                    writeln!(output, "   Preview: {}", preview(&source.content))?;
                }
            }
            Err(e) => writeln!(output, "\nNo answer available: {}", e)?,
        }
    }

    Ok(())
}

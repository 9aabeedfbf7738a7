/// Line-oriented console presenter
use crate::bridge::Bridge;
use crate::fanout::PresentationHandle;
use crate::types::{Message, Notice};
use colored::*;
use regex::Regex;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, BufReader};

fn cq_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [(r"\[CQ:image,.*?\]", "[image]"), (r"\[CQ:forward,.*?\]", "[forward]")]
            .into_iter()
            .filter_map(|(pattern, placeholder)| Regex::new(pattern).ok().map(|re| (re, placeholder)))
            .collect()
    })
}

/// Replace bulky CQ codes with short placeholders
pub fn simplify_cq_codes(content: &str) -> String {
    cq_patterns()
        .iter()
        .fold(content.to_string(), |text, (re, placeholder)| {
            re.replace_all(&text, *placeholder).into_owned()
        })
}

fn print_message(msg: &Message) {
    let time = msg.timestamp.with_timezone(&chrono::Local).format("%H:%M");
    let content = simplify_cq_codes(&msg.content);
    if msg.is_own() {
        println!("{} {} {}", time.to_string().dimmed(), msg.sender_name.bright_green().bold(), content);
    } else {
        let name = if msg.sender_name.is_empty() { &msg.sender_id } else { &msg.sender_name };
        println!("{} {} {}", time.to_string().dimmed(), name.bold(), content);
    }
}

/// Show the active chat and forward typed lines to it until the
/// message stream ends.
pub async fn run_console(bridge: Bridge, mut handle: PresentationHandle) {
    println!("{}", "⚡ OneBridge console".bright_cyan().bold());
    println!("  Pick a chat with {} then type to send.", "ctl use <id>".cyan());

    let mut active = String::new();
    let mut stdin = Some(BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            msg = handle.messages.recv() => match msg {
                Some(msg) if msg.chat_id == active => print_message(&msg),
                Some(msg) => {
                    let name = bridge.hub().get_chat_name(&msg.chat_id);
                    let label = if name.is_empty() { msg.chat_id.clone() } else { name };
                    println!("{}", format!("· new message in {}", label).dimmed());
                }
                None => {
                    println!("{}", "✗ Connection to the backend closed".red().bold());
                    return;
                }
            },
            Some(notice) = handle.notices.recv() => match notice {
                Notice::ActiveChatChanged { id, name } => {
                    active = id;
                    let known = bridge.hub().get_chat_name(&active);
                    let title = if known.is_empty() { name } else { known };
                    println!();
                    println!("{}", format!("── Chat with {} ──", title).bright_white().bold());
                    match bridge.history(&active, bridge.history_limit()) {
                        Ok(history) => history.iter().for_each(print_message),
                        Err(e) => println!("{} Error loading history: {}", "✗".red(), e),
                    }
                }
                Notice::CachesPopulated => {
                    println!("{} Chat list loaded", "✓".green());
                }
                Notice::SendFailed { chat_id, reason } => {
                    println!("{} Error sending to {}: {}", "✗".red(), chat_id, reason);
                }
            },
            line = next_line(&mut stdin) => match line {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if active.is_empty() {
                        println!("{}", "No active chat. Use `ctl use <id>` first.".yellow());
                    } else if !handle.send(&active, line).await {
                        println!("{} Outbound queue closed", "✗".red());
                    }
                }
                None => stdin = None,
            },
        }
    }
}

async fn next_line(
    stdin: &mut Option<tokio::io::Lines<BufReader<tokio::io::Stdin>>>,
) -> Option<String> {
    match stdin {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplify_cq_codes() {
        let raw = "look [CQ:image,file=abc.jpg,url=http://x] and [CQ:forward,id=42] ok";
        assert_eq!(simplify_cq_codes(raw), "look [image] and [forward] ok");
        assert_eq!(simplify_cq_codes("plain"), "plain");
    }
}

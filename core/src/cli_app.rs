use crate::config::DEFAULT_CONTROL_PORT;
use crate::types::{ChatInfo, Message};
use bytes::Bytes;
use colored::*;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// Controller CLI: drives a running daemon through its control server.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("ctl")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let command = &args[1];

    match command.as_str() {
        "list" => {
            list_chats().await?;
        }
        "use" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} use <chat_id> [name]", bin).yellow());
                return Ok(());
            }
            let name = args[3..].join(" ");
            use_chat(&args[2], &name).await?;
        }
        "send" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} send <message...>", bin).yellow());
                return Ok(());
            }
            let message = args[2..].join(" ");
            send_message(message).await?;
        }
        "history" => {
            let chat_id = args.get(2).cloned().unwrap_or_default();
            let limit = args
                .get(3)
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(20);
            show_history(&chat_id, limit).await?;
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "⚡ OneBridge CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {}                        List all friends and groups", "list".cyan());
    println!("  {} <chat_id> [name]        Switch the active chat", "use".cyan());
    println!("  {} <message...>           Send to the active chat", "send".cyan());
    println!(
        "  {} [chat_id] [limit]   Show stored messages",
        "history".cyan()
    );
}

fn control_port() -> u16 {
    std::env::var("ONEBRIDGE_CONTROL_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_CONTROL_PORT)
}

async fn request(method: Method, path: &str, body: String) -> anyhow::Result<(StatusCode, String)> {
    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let uri: hyper::Uri = format!("http://127.0.0.1:{}{}", control_port(), path).parse()?;
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body)))?;

    let resp = client.request(req).await.map_err(|e| {
        anyhow::anyhow!(
            "could not reach the daemon on port {} ({}). Is it running?",
            control_port(),
            e
        )
    })?;
    let status = resp.status();
    let bytes = resp.into_body().collect().await?.to_bytes();
    Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
}

fn print_failure(status: StatusCode, body: &str) {
    eprintln!("{} {} {}", "✗".red().bold(), status, body.trim_end());
}

async fn list_chats() -> anyhow::Result<()> {
    let (status, body) = request(Method::GET, "/get_chats", String::new()).await?;
    if !status.is_success() {
        print_failure(status, &body);
        return Ok(());
    }
    let chats: Vec<ChatInfo> = serde_json::from_str(&body)?;

    println!("{}", "--- Groups / Friends ---".bright_white().bold());
    for chat in chats {
        let preview = chat
            .latest_preview
            .map(|p| format!("  {}", p).dimmed().to_string())
            .unwrap_or_default();
        println!(
            "type: {:<7} | ID: {:<12} | name: {}{}",
            chat.chat_type.as_str(),
            chat.id,
            chat.name,
            preview
        );
    }
    Ok(())
}

async fn use_chat(id: &str, name: &str) -> anyhow::Result<()> {
    let mut path = format!("/set_active_chat?id={}", urlencoding::encode(id));
    if !name.is_empty() {
        path.push_str(&format!("&name={}", urlencoding::encode(name)));
    }
    let (status, body) = request(Method::POST, &path, String::new()).await?;
    if status.is_success() {
        print!("{} {}", "✓".green(), body);
    } else {
        print_failure(status, &body);
    }
    Ok(())
}

async fn send_message(message: String) -> anyhow::Result<()> {
    let (status, body) = request(Method::POST, "/send_message", message).await?;
    if status.is_success() {
        print!("{} {}", "✓".green(), body);
    } else {
        print_failure(status, &body);
    }
    Ok(())
}

async fn show_history(chat_id: &str, limit: usize) -> anyhow::Result<()> {
    let mut path = format!("/messages?limit={}", limit);
    if !chat_id.is_empty() {
        path.push_str(&format!("&chat_id={}", urlencoding::encode(chat_id)));
    }
    let (status, body) = request(Method::GET, &path, String::new()).await?;
    if !status.is_success() {
        print_failure(status, &body);
        return Ok(());
    }
    let messages: Vec<Message> = serde_json::from_str(&body)?;
    if messages.is_empty() {
        println!("{}", "No stored messages".dimmed());
    }
    for msg in messages {
        println!(
            "{} {} {}",
            msg.timestamp
                .with_timezone(&chrono::Local)
                .format("%m-%d %H:%M")
                .to_string()
                .dimmed(),
            msg.sender_name.bold(),
            msg.content
        );
    }
    Ok(())
}

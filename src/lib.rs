pub mod agents;
pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod improver;
pub mod intent;
pub mod json_extract;
pub mod logging;
pub mod mcp;
pub mod session;
pub mod support;

#[cfg(test)]
pub(crate) mod test_support;

pub use agents::Agent;
pub use config::AppConfig;
pub use context::SwitchOutcome;
pub use error::{Result, SwitchboardError};
pub use intent::{DetectedIntent, Intent};
pub use session::{SendResult, Session};

use mcp::{McpAction, McpTool};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use support::TicketStatus;

// ============ Commands ============

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    Help,
    Agents,
    SelectAgent(Agent),
    Models,
    SelectModel(String),
    NewConversation,
    Rate { rating: u8, text: Option<String> },
    ThumbsUp,
    Stats(Option<Agent>),
    Improve(Option<Agent>),
    Improvements(Option<Agent>),
    Activate { agent: Agent, improvement_id: String },
    Revert(Agent),
    CreateTicket { title: String, description: String },
    Tickets,
    RouteTicket(String),
    SetTicketStatus { ticket_id: String, status: TicketStatus },
    Tools,
    ToggleTool(McpTool),
    Mcp(McpAction),
    DriveFiles(Option<String>),
    DriveSearch(String),
    DriveFile(String),
    SheetRow { spreadsheet_id: String, values: Vec<Value> },
    AutoStatus,
    AutoSwitch(bool),
    AutoTickets(bool),
    Suggest(String),
    History,
    Quit,
}

const HELP: &str = "\
Type a message to chat. Commands:
  /agents                      list agents        /agent <id>          select agent
  /models                      list models        /model <id>          select model
  /new                         new conversation   /history             context switches
  /suggest <message>           propose an agent without switching
  /rate <1-5> [comment]        rate last reply    /good                quick 5/5
  /stats [agent]               feedback stats
  /improve [agent]             generate improvement (needs 3 ratings)
  /improvements [agent]        list latest        /activate <agent> <id>   /revert <agent>
  /ticket <title> | <desc>     open ticket        /tickets             list tickets
  /route <id>                  re-route ticket    /status <id> <status>
  /tools                       list tools         /tool <id>           toggle tool
  /mcp <tool> <action> [json]  raw relay call
  /drive [query]  /search <term>  /file <id>  /sheet-row <spreadsheet id> <json array>
  /auto [switch|tickets on|off]  show or toggle automation
  /quit";

fn parse_agent(arg: &str) -> std::result::Result<Agent, String> {
    Agent::from_str(arg).ok_or_else(|| format!("Unknown agent '{}'", arg))
}

fn optional_agent(arg: &str) -> std::result::Result<Option<Agent>, String> {
    if arg.is_empty() {
        Ok(None)
    } else {
        parse_agent(arg).map(Some)
    }
}

fn parse_switch(arg: &str) -> std::result::Result<bool, String> {
    match arg {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("Expected on|off, got '{}'", other)),
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn required<'a>(arg: &'a str, usage: &str) -> std::result::Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("Usage: {}", usage))
    } else {
        Ok(arg)
    }
}

/// Parse one REPL line.
pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let line = line.trim();
    if !line.starts_with('/') {
        return Ok(Command::Send(line.to_string()));
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    match name {
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        "/agents" => Ok(Command::Agents),
        "/agent" => parse_agent(required(rest, "/agent <id>")?).map(Command::SelectAgent),
        "/models" => Ok(Command::Models),
        "/model" => Ok(Command::SelectModel(required(rest, "/model <id>")?.to_string())),
        "/new" => Ok(Command::NewConversation),
        "/history" => Ok(Command::History),
        "/suggest" => Ok(Command::Suggest(required(rest, "/suggest <message>")?.to_string())),
        "/good" => Ok(Command::ThumbsUp),
        "/rate" => {
            let (rating, text) = match rest.split_once(char::is_whitespace) {
                Some((rating, text)) => (rating, Some(text.trim().to_string())),
                None => (rest, None),
            };
            let rating = rating
                .parse::<u8>()
                .map_err(|_| "Usage: /rate <1-5> [comment]".to_string())?;
            Ok(Command::Rate { rating, text })
        }
        "/stats" => optional_agent(rest).map(Command::Stats),
        "/improve" => optional_agent(rest).map(Command::Improve),
        "/improvements" => optional_agent(rest).map(Command::Improvements),
        "/activate" => {
            let (agent, id) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "Usage: /activate <agent> <improvement id>".to_string())?;
            Ok(Command::Activate {
                agent: parse_agent(agent)?,
                improvement_id: id.trim().to_string(),
            })
        }
        "/revert" => parse_agent(required(rest, "/revert <agent>")?).map(Command::Revert),
        "/ticket" => {
            let (title, description) = rest
                .split_once('|')
                .ok_or_else(|| "Usage: /ticket <title> | <description>".to_string())?;
            Ok(Command::CreateTicket {
                title: title.trim().to_string(),
                description: description.trim().to_string(),
            })
        }
        "/tickets" => Ok(Command::Tickets),
        "/route" => Ok(Command::RouteTicket(required(rest, "/route <ticket id>")?.to_string())),
        "/status" => {
            let (id, status) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "Usage: /status <ticket id> <status>".to_string())?;
            let status = TicketStatus::from_str(status)
                .ok_or_else(|| format!("Unknown status '{}'", status.trim()))?;
            Ok(Command::SetTicketStatus { ticket_id: id.to_string(), status })
        }
        "/tools" => Ok(Command::Tools),
        "/tool" => {
            let id = required(rest, "/tool <id>")?;
            McpTool::from_id(id)
                .map(Command::ToggleTool)
                .ok_or_else(|| format!("Unknown tool '{}'", id))
        }
        "/mcp" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let tool = parts.next().filter(|s| !s.is_empty());
            let action = parts.next().filter(|s| !s.is_empty());
            let (Some(tool), Some(action)) = (tool, action) else {
                return Err("Usage: /mcp <tool> <action> [json]".to_string());
            };
            let parameters = match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
                Some(raw) => serde_json::from_str(raw).map_err(|e| format!("Invalid JSON parameters: {}", e))?,
                None => Value::Object(Default::default()),
            };
            Ok(Command::Mcp(McpAction {
                tool: tool.to_string(),
                action: action.to_string(),
                parameters,
            }))
        }
        "/drive" => Ok(Command::DriveFiles((!rest.is_empty()).then(|| rest.to_string()))),
        "/search" => Ok(Command::DriveSearch(required(rest, "/search <term>")?.to_string())),
        "/file" => Ok(Command::DriveFile(required(rest, "/file <id>")?.to_string())),
        "/sheet-row" => {
            let (id, raw) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "Usage: /sheet-row <spreadsheet id> <json array>".to_string())?;
            let values: Vec<Value> =
                serde_json::from_str(raw.trim()).map_err(|e| format!("Invalid JSON array: {}", e))?;
            Ok(Command::SheetRow { spreadsheet_id: id.to_string(), values })
        }
        "/auto" if rest.is_empty() => Ok(Command::AutoStatus),
        "/auto" => {
            let (which, state) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "Usage: /auto switch|tickets on|off".to_string())?;
            let on = parse_switch(state.trim())?;
            match which {
                "switch" => Ok(Command::AutoSwitch(on)),
                "tickets" => Ok(Command::AutoTickets(on)),
                other => Err(format!("Unknown automation '{}'", other)),
            }
        }
        other => Err(format!("Unknown command {} (try /help)", other)),
    }
}

// ============ Dispatch ============

async fn dispatch(session: &mut Session, command: Command) -> std::result::Result<String, String> {
    match command {
        Command::Send(content) => {
            if content.is_empty() {
                return Ok(String::new());
            }
            let result = session.send_message(&content).await.map_err(|e| e.to_string())?;
            let mut out = String::new();
            for notice in &result.notices {
                out.push_str(&format!("· {}\n", notice));
            }
            let agent = session.agent();
            out.push_str(&format!("{} {}: {}", agent.icon(), agent.name(), result.reply.content));
            Ok(out)
        }
        Command::Help => Ok(HELP.to_string()),
        Command::Agents => Ok(Agent::ALL
            .iter()
            .map(|a| {
                let marker = if *a == session.agent() { "*" } else { " " };
                let custom = if session.roster().is_customized(*a) { " (improved)" } else { "" };
                format!("{} {} {:<8} {} - {}{}", marker, a.icon(), a.as_str(), a.name(), a.description(), custom)
            })
            .collect::<Vec<_>>()
            .join("\n")),
        Command::SelectAgent(agent) => {
            session.select_agent(agent);
            Ok(format!("Now talking to {} {}", agent.icon(), agent.name()))
        }
        Command::Models => Ok(agents::AVAILABLE_MODELS
            .iter()
            .map(|m| {
                let marker = if m.id == session.model() { "*" } else { " " };
                format!("{} {:<32} {} - {}", marker, m.id, m.name, m.description)
            })
            .collect::<Vec<_>>()
            .join("\n")),
        Command::SelectModel(id) => {
            session.select_model(&id).map_err(|e| e.to_string())?;
            Ok(format!("Model set to {}", id))
        }
        Command::NewConversation => {
            let id = session.new_conversation().map_err(|e| e.to_string())?;
            Ok(format!("Started conversation {}", id))
        }
        Command::Rate { rating, text } => {
            session.rate_last_reply(rating, text.as_deref()).map_err(|e| e.to_string())?;
            Ok(format!("Thanks! Rated {}/5", rating))
        }
        Command::ThumbsUp => {
            session.thumbs_up().map_err(|e| e.to_string())?;
            Ok("Thanks for the feedback!".to_string())
        }
        Command::Stats(agent) => {
            let agent = agent.unwrap_or(session.agent());
            let stats = session.agent_stats(agent).map_err(|e| e.to_string())?;
            Ok(format!(
                "{}: avg {} over {} ratings, {} conversations{}",
                agent.name(),
                feedback::format_rating(stats.avg_rating),
                stats.feedback_count,
                stats.conversation_count,
                if feedback::can_generate_improvement(stats.feedback_count) { "" } else { " (need 3 ratings to improve)" }
            ))
        }
        Command::Improve(agent) => {
            let agent = agent.unwrap_or(session.agent());
            let generated = session.generate_improvement(agent).await.map_err(|e| e.to_string())?;
            Ok(format!(
                "Improvement {} ({} ratings, avg {}):\n{}\n\nReason: {}\nActivate with /activate {} {}",
                generated.improvement.id,
                generated.stats.feedback_count,
                feedback::format_rating(generated.stats.avg_rating),
                generated.improvement.improved_prompt,
                generated.improvement.improvement_reason,
                agent.as_str(),
                generated.improvement.id
            ))
        }
        Command::Improvements(agent) => {
            let agent = agent.unwrap_or(session.agent());
            let list = session.list_improvements(agent).map_err(|e| e.to_string())?;
            if list.is_empty() {
                return Ok(format!("No improvements for {}", agent.name()));
            }
            Ok(list
                .iter()
                .map(|i| format!(
                    "{} {} [{}] {}",
                    if i.is_active { "*" } else { " " },
                    i.id,
                    i.created_at,
                    i.improvement_reason
                ))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::Activate { agent, improvement_id } => {
            session.activate_improvement(agent, &improvement_id).map_err(|e| e.to_string())?;
            Ok(format!("{} now uses improvement {}", agent.name(), improvement_id))
        }
        Command::Revert(agent) => {
            session.revert_agent(agent).map_err(|e| e.to_string())?;
            Ok(format!("{} reverted to its default prompt", agent.name()))
        }
        Command::CreateTicket { title, description } => {
            let ticket = session.create_ticket(&title, &description).await.map_err(|e| e.to_string())?;
            Ok(format!(
                "Ticket {} [{} / {}] -> {}",
                ticket.id,
                ticket.category.as_str(),
                ticket.priority.as_str(),
                ticket.assigned_agent.as_deref().unwrap_or("unassigned")
            ))
        }
        Command::Tickets => {
            let tickets = session.tickets().map_err(|e| e.to_string())?;
            if tickets.is_empty() {
                return Ok("No tickets".to_string());
            }
            Ok(tickets
                .iter()
                .map(|t| format!(
                    "{} {:<12} {:<8} {:<15} {}",
                    t.id,
                    t.status.as_str(),
                    t.priority.as_str(),
                    t.category.as_str(),
                    t.title
                ))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::RouteTicket(id) => {
            let agent = session.route_ticket(&id).map_err(|e| e.to_string())?;
            Ok(format!("Ticket {} routed to {}", id, agent))
        }
        Command::SetTicketStatus { ticket_id, status } => {
            let ticket = session.update_ticket_status(&ticket_id, status).map_err(|e| e.to_string())?;
            Ok(format!("Ticket {} is now {}", ticket.id, ticket.status.as_str()))
        }
        Command::Tools => Ok(McpTool::ALL
            .iter()
            .map(|t| format!(
                "[{}] {} {:<14} {}",
                if session.tool_enabled(*t) { "x" } else { " " },
                t.icon(),
                t.id(),
                t.description()
            ))
            .collect::<Vec<_>>()
            .join("\n")),
        Command::ToggleTool(tool) => {
            let on = session.toggle_tool(tool);
            Ok(format!("{} {}", tool.name(), if on { "enabled" } else { "disabled" }))
        }
        Command::Mcp(action) => {
            let result = session.execute_tool(&action).await.map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
        }
        Command::DriveFiles(query) => {
            let files = session.relay().list_drive_files(query.as_deref()).await.map_err(|e| e.to_string())?;
            Ok(format_files(&files))
        }
        Command::DriveSearch(term) => {
            let files = session.relay().search_drive_files(&term).await.map_err(|e| e.to_string())?;
            Ok(format_files(&files))
        }
        Command::DriveFile(id) => {
            let file = session.relay().get_drive_file(&id).await.map_err(|e| e.to_string())?;
            Ok(format!(
                "{} ({})\nmodified {}\n{}",
                file.name,
                file.mime_type,
                file.modified_time,
                file.web_view_link.unwrap_or_default()
            ))
        }
        Command::SheetRow { spreadsheet_id, values } => {
            session.relay().add_sheet_row(&spreadsheet_id, values).await.map_err(|e| e.to_string())?;
            Ok(format!("Row added to {}", spreadsheet_id))
        }
        Command::AutoStatus => Ok(format!(
            "Auto context switch {}, auto ticket creation {}",
            on_off(session.auto_context_switch()),
            on_off(session.auto_create_tickets())
        )),
        Command::AutoSwitch(on) => {
            session.set_auto_context_switch(on);
            Ok(format!("Auto context switch {}", on_off(on)))
        }
        Command::AutoTickets(on) => {
            session.set_auto_create_tickets(on);
            Ok(format!("Auto ticket creation {}", on_off(on)))
        }
        Command::Suggest(content) => {
            let decision = session.suggest_agent(&content).await;
            Ok(match decision.outcome {
                SwitchOutcome::Suggested(agent) | SwitchOutcome::Switched(agent) => format!(
                    "Suggest {} {} ({} {:.0}%). Use /agent {} to switch.",
                    agent.icon(),
                    agent.name(),
                    decision.detected.intent.as_str(),
                    decision.detected.confidence,
                    agent.as_str()
                ),
                SwitchOutcome::NoAction => format!(
                    "Stay with {} ({} {:.0}%)",
                    session.agent().name(),
                    decision.detected.intent.as_str(),
                    decision.detected.confidence
                ),
            })
        }
        Command::History => {
            let lines: Vec<String> = session
                .context_history()
                .map(|s| format!(
                    "{} {} -> {} ({})",
                    s.timestamp.format("%H:%M:%S"),
                    s.previous_agent.as_str(),
                    s.new_agent.as_str(),
                    s.reason
                ))
                .collect();
            Ok(if lines.is_empty() { "No context switches yet".to_string() } else { lines.join("\n") })
        }
        Command::Quit => Ok(String::new()),
    }
}

fn format_files(files: &[mcp::GoogleDriveFile]) -> String {
    if files.is_empty() {
        return "No files".to_string();
    }
    files
        .iter()
        .map(|f| format!("{}  {}  ({})", f.id, f.name, f.mime_type))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ Entry Point ============

/// Terminal front end: read lines, run them against one session.
pub fn run() {
    let config = AppConfig::from_env();

    if let Err(e) = logging::init_logging(&config.log_dir, config.log_console) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    if let Err(e) = logging::cleanup_old_logs(&config.log_dir) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async {
        let mut session = match Session::open(&config) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("Failed to open session: {}", e);
                return;
            }
        };

        println!("Switchboard ready. Talking to {} {}. /help for commands.", session.agent().icon(), session.agent().name());

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("> ");
            let _ = io::stdout().flush();

            let Some(Ok(line)) = lines.next() else { break };
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };
            if command == Command::Quit {
                break;
            }

            match dispatch(&mut session, command).await {
                Ok(out) if out.is_empty() => {}
                Ok(out) => println!("{}", out),
                Err(e) => {
                    logging::log_error(Some(session.conversation_id()), &e);
                    println!("! {}", e);
                }
            }
        }
    });
}

// ABOUTME: Session tool definitions, schemas and handlers for tools/list and tools/call
// ABOUTME: Every tool returns text; failures are reported in-band as "Error <doing>: <detail>"

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shellbox_sandbox::CommandOutput;
use shellbox_sessions::Actor;
use shellbox_storage::{generate_session_id, StateRecord, TaskStatus};
use std::collections::BTreeMap;
use std::fmt::{Display, Write as _};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::ToolContext;

// MCP Tool Types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsRequest {
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub type_name: String,
    pub properties: BTreeMap<String, ToolInputSchemaProperty>,
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchemaProperty {
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl CallToolResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error: is_error.then_some(true),
        }
    }
}

// Request types for our tools
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetWorkingDirRequest {
    pub session_id: String,
    pub working_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunCliRequest {
    pub session_id: String,
    #[serde(alias = "aws_command")]
    pub args: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunShellRequest {
    pub session_id: String,
    #[serde(alias = "cmd_string")]
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveNoteRequest {
    pub session_id: String,
    #[serde(alias = "note_text")]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveNoteRequest {
    pub session_id: String,
    pub note_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetGoalRequest {
    pub session_id: String,
    pub goal: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddTaskRequest {
    pub session_id: String,
    pub task: String,
    pub sort_order: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTaskStatusRequest {
    pub session_id: String,
    pub task_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseTaskRequest {
    pub session_id: String,
    pub task_id: String,
    pub status: String,
    pub result: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRequest {
    pub session_id: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteFileRequest {
    pub session_id: String,
    pub file_path: String,
    pub file_data: String,
}

// Tool schemas
fn property(type_name: &str, description: &str) -> ToolInputSchemaProperty {
    ToolInputSchemaProperty {
        type_name: Some(type_name.to_string()),
        description: Some(description.to_string()),
        enum_values: None,
    }
}

fn status_property(description: &str, statuses: &[TaskStatus]) -> ToolInputSchemaProperty {
    ToolInputSchemaProperty {
        enum_values: Some(statuses.iter().map(|s| s.as_str().to_string()).collect()),
        ..property("string", description)
    }
}

fn tool(
    name: &str,
    description: &str,
    properties: Vec<(&str, ToolInputSchemaProperty)>,
    optional: &[&str],
) -> Tool {
    let mut schema = BTreeMap::new();
    schema.insert(
        "session_id".to_string(),
        property(
            "string",
            "Session the call belongs to; omit to start a new session",
        ),
    );
    for (key, value) in properties {
        schema.insert(key.to_string(), value);
    }

    let required = schema
        .keys()
        .filter(|key| key.as_str() != "session_id" && !optional.contains(&key.as_str()))
        .cloned()
        .collect();

    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: ToolInputSchema {
            type_name: "object".to_string(),
            properties: schema,
            required,
        },
    }
}

pub fn tool_definitions(cli_program: &str) -> Vec<Tool> {
    vec![
        tool(
            "set_working_dir",
            "Set the working directory for shell commands. Must be an absolute path.",
            vec![("working_dir", property("string", "Absolute path inside the container"))],
            &[],
        ),
        tool(
            "run_cli",
            &format!(
                "Run a `{}` command in the working directory and return its output.",
                cli_program
            ),
            vec![(
                "args",
                property(
                    "string",
                    &format!("Arguments, with or without the leading `{}`", cli_program),
                ),
            )],
            &[],
        ),
        tool(
            "run_shell",
            "Run a shell command in the working directory and return its output.",
            vec![("command", property("string", "Command line passed to /bin/sh -c"))],
            &[],
        ),
        tool(
            "save_note",
            "Save a note to session state to remember facts from commands, research or conversation.",
            vec![("text", property("string", "Note text"))],
            &[],
        ),
        tool(
            "remove_note",
            "Remove a note from session state.",
            vec![("note_id", property("string", "Id returned by save_note"))],
            &[],
        ),
        tool(
            "set_goal",
            "Set or update the goal. Use markdown with a **User Story** and **Acceptance Criteria** section.",
            vec![("goal", property("string", "Goal in markdown"))],
            &[],
        ),
        tool(
            "add_task",
            "Add a task to the task list.",
            vec![
                ("task", property("string", "Task description")),
                (
                    "sort_order",
                    property("number", "Position in the list; defaults to after the last task"),
                ),
            ],
            &["sort_order"],
        ),
        tool(
            "set_task_status",
            "Set the status of a task.",
            vec![
                ("task_id", property("string", "Id returned by add_task")),
                (
                    "status",
                    status_property(
                        "New status",
                        &[
                            TaskStatus::New,
                            TaskStatus::InProgress,
                            TaskStatus::Done,
                            TaskStatus::Cancelled,
                        ],
                    ),
                ),
            ],
            &[],
        ),
        tool(
            "close_task",
            "Close a task with a final status and a markdown result describing the outcome.",
            vec![
                ("task_id", property("string", "Id returned by add_task")),
                (
                    "status",
                    status_property("Final status", &[TaskStatus::Done, TaskStatus::Cancelled]),
                ),
                ("result", property("string", "Outcome of the task in markdown")),
            ],
            &[],
        ),
        tool("clear_tasks", "Remove every task from the task list.", vec![], &[]),
        tool(
            "open_file",
            "Read a file into session state. Relative paths resolve against the working directory.",
            vec![("file_path", property("string", "File to open"))],
            &[],
        ),
        tool(
            "close_file",
            "Remove an open file from session state.",
            vec![("file_path", property("string", "File to close"))],
            &[],
        ),
        tool(
            "write_file",
            "Write text to a file. Relative paths resolve against the working directory.",
            vec![
                ("file_path", property("string", "Destination file")),
                ("file_data", property("string", "Full file contents")),
            ],
            &[],
        ),
        tool(
            "get_state",
            "Show the session's working directory, goal, tasks, notes and open files.",
            vec![],
            &[],
        ),
    ]
}

// Tool handlers
pub async fn tools_list(
    _request: Option<ListToolsRequest>,
    context: &ToolContext,
) -> Result<ListToolsResult> {
    Ok(ListToolsResult {
        tools: tool_definitions(context.cli_program()),
        next_cursor: None,
    })
}

pub async fn tools_call(
    request: Option<CallToolRequest>,
    context: &ToolContext,
) -> Result<CallToolResult> {
    let call_request = request.ok_or_else(|| anyhow!("Missing tool call request"))?;
    let mut arguments = call_request.arguments.unwrap_or_else(|| json!({}));

    // Callers without a session get a fresh one, announced in the reply
    let mut generated = None;
    if is_known_tool(&call_request.name)
        && arguments.get("session_id").map_or(true, Value::is_null)
    {
        if let Some(fields) = arguments.as_object_mut() {
            let id = generate_session_id();
            info!("Started session {}", id);
            fields.insert("session_id".to_string(), Value::String(id.clone()));
            generated = Some(id);
        }
    }

    let session_id = arguments
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    info!("Tool call: {}", call_request.name);
    let outcome = dispatch(&call_request.name, arguments, context).await;
    let (text, is_error) = match outcome {
        Ok(text) => (text, false),
        Err(text) => {
            warn!("Tool {} failed: {}", call_request.name, text);
            (text, true)
        }
    };
    let text = match generated {
        Some(id) => format!("Session ID: {}\n{}", id, text),
        None => text,
    };

    if let Some(session_id) = session_id.filter(|s| !s.trim().is_empty()) {
        if let Err(e) = context
            .registry()
            .store()
            .add_message(&session_id, "tool", &text)
            .await
        {
            warn!("Failed to record tool output for {}: {}", session_id, e);
        }
    }

    Ok(CallToolResult::text(text, is_error))
}

/// Ok is the tool's reply; Err is an already formatted error reply
type ToolOutcome = std::result::Result<String, String>;

async fn dispatch(name: &str, arguments: Value, context: &ToolContext) -> ToolOutcome {
    match name {
        "set_working_dir" => set_working_dir(parse(name, arguments)?, context).await,
        "run_cli" => run_cli(parse(name, arguments)?, context).await,
        "run_shell" => run_shell(parse(name, arguments)?, context).await,
        "save_note" => save_note(parse(name, arguments)?, context).await,
        "remove_note" => remove_note(parse(name, arguments)?, context).await,
        "set_goal" => set_goal(parse(name, arguments)?, context).await,
        "add_task" => add_task(parse(name, arguments)?, context).await,
        "set_task_status" => set_task_status(parse(name, arguments)?, context).await,
        "close_task" => close_task(parse(name, arguments)?, context).await,
        "clear_tasks" => clear_tasks(parse(name, arguments)?, context).await,
        "open_file" => open_file(parse(name, arguments)?, context).await,
        "close_file" => close_file(parse(name, arguments)?, context).await,
        "write_file" => write_file(parse(name, arguments)?, context).await,
        "get_state" => get_state(parse(name, arguments)?, context).await,
        _ => Err(failure("calling tool", format!("unknown tool {}", name))),
    }
}

const TOOL_NAMES: &[&str] = &[
    "set_working_dir",
    "run_cli",
    "run_shell",
    "save_note",
    "remove_note",
    "set_goal",
    "add_task",
    "set_task_status",
    "close_task",
    "clear_tasks",
    "open_file",
    "close_file",
    "write_file",
    "get_state",
];

pub(crate) fn is_known_tool(name: &str) -> bool {
    TOOL_NAMES.contains(&name)
}

fn parse<T: DeserializeOwned>(tool: &str, arguments: Value) -> std::result::Result<T, String> {
    serde_json::from_value(arguments)
        .map_err(|e| failure(&format!("parsing arguments for {}", tool), e))
}

fn failure(doing: &str, err: impl Display) -> String {
    format!("Error {}: {}", doing, err)
}

async fn resolve(
    context: &ToolContext,
    session_id: &str,
    doing: &str,
) -> std::result::Result<Arc<Actor>, String> {
    context
        .registry()
        .resolve(session_id)
        .await
        .map_err(|e| failure(doing, e))
}

/// Stdout of a successful command, or an error reply carrying exit code and both streams
fn command_result(doing: &str, what: &str, output: CommandOutput) -> ToolOutcome {
    if output.success() {
        return Ok(output.stdout);
    }
    Err(format!(
        "Error {}: {} failed with exit code {}: {}\n{}",
        doing, what, output.exit_code, output.stderr, output.stdout
    ))
}

/// Prefix `program` unless `args` already starts with it
pub fn cli_command(program: &str, args: &str) -> String {
    let args = args.trim();
    match args.strip_prefix(program) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => args.to_string(),
        _ => format!("{} {}", program, args),
    }
}

async fn set_working_dir(request: SetWorkingDirRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "setting working directory";
    let actor = resolve(context, &request.session_id, doing).await?;
    actor
        .state()
        .set_working_directory(&request.working_dir)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok(format!("Working directory set to {}", request.working_dir))
}

async fn run_cli(request: RunCliRequest, context: &ToolContext) -> ToolOutcome {
    let program = context.cli_program();
    let doing = format!("running {} command", program);
    let actor = resolve(context, &request.session_id, &doing).await?;

    let command = cli_command(program, &request.args);
    debug!("CLI command for {}: {}", request.session_id, command);
    let output = actor.run(&command).await.map_err(|e| failure(&doing, e))?;
    command_result(&doing, &format!("{} command", program), output)
}

async fn run_shell(request: RunShellRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "running shell command";
    let actor = resolve(context, &request.session_id, doing).await?;

    let output = actor
        .run(&request.command)
        .await
        .map_err(|e| failure(doing, e))?;
    command_result(doing, "shell command", output)
}

async fn save_note(request: SaveNoteRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "saving note";
    let actor = resolve(context, &request.session_id, doing).await?;
    let id = actor
        .state()
        .add_note(&request.text)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok(format!("Note saved to state memory successfully ({}).", id))
}

async fn remove_note(request: RemoveNoteRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "removing note";
    let actor = resolve(context, &request.session_id, doing).await?;
    let removed = actor
        .state()
        .remove_note(&request.note_id)
        .await
        .map_err(|e| failure(doing, e))?;

    if removed {
        Ok("Note removed from state memory successfully.".to_string())
    } else {
        Ok(format!("No note with id {}; nothing removed.", request.note_id))
    }
}

async fn set_goal(request: SetGoalRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "setting goal";
    let actor = resolve(context, &request.session_id, doing).await?;
    actor
        .state()
        .set_goal(&request.goal)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok(format!("Goal set to {}", request.goal))
}

async fn add_task(request: AddTaskRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "adding task";
    let actor = resolve(context, &request.session_id, doing).await?;
    let id = actor
        .state()
        .add_task(&request.task, request.sort_order)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok(format!("Task added successfully ({}).", id))
}

async fn set_task_status(request: SetTaskStatusRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "setting task status";
    let status = TaskStatus::from_str(&request.status).map_err(|e| failure(doing, e))?;
    let actor = resolve(context, &request.session_id, doing).await?;
    actor
        .state()
        .set_task_status(&request.task_id, status)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok(format!(
        "Task status set to {} for task {}",
        status, request.task_id
    ))
}

async fn close_task(request: CloseTaskRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "closing task";
    let status = TaskStatus::from_str(&request.status).map_err(|e| failure(doing, e))?;
    let actor = resolve(context, &request.session_id, doing).await?;
    actor
        .state()
        .close_task(&request.task_id, status, &request.result)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok(format!(
        "Task closed with status {} and result saved.",
        status
    ))
}

async fn clear_tasks(request: SessionRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "clearing tasks";
    let actor = resolve(context, &request.session_id, doing).await?;
    let cleared = actor
        .state()
        .clear_tasks()
        .await
        .map_err(|e| failure(doing, e))?;
    debug!("Cleared {} task(s) for {}", cleared, request.session_id);
    Ok("Tasks cleared successfully.".to_string())
}

async fn open_file(request: FileRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "opening file";
    let actor = resolve(context, &request.session_id, doing).await?;

    let output = actor
        .read_file(&request.file_path)
        .await
        .map_err(|e| failure(doing, e))?;
    let content = command_result(doing, "cat", output)?;

    actor
        .state()
        .open_file(&request.file_path, &content)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok(format!("{} opened successfully:\n{}", request.file_path, content))
}

async fn close_file(request: FileRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "closing file";
    let actor = resolve(context, &request.session_id, doing).await?;
    actor
        .state()
        .close_file(&request.file_path)
        .await
        .map_err(|e| failure(doing, e))?;
    Ok("File closed successfully.".to_string())
}

async fn write_file(request: WriteFileRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "writing file";
    let actor = resolve(context, &request.session_id, doing).await?;

    let output = actor
        .write_file(&request.file_path, &request.file_data)
        .await
        .map_err(|e| failure(doing, e))?;
    command_result(doing, "write", output)?;
    Ok("File written successfully.".to_string())
}

async fn get_state(request: SessionRequest, context: &ToolContext) -> ToolOutcome {
    let doing = "loading state";
    let actor = resolve(context, &request.session_id, doing).await?;
    let record = actor.state().load().await.map_err(|e| failure(doing, e))?;
    Ok(render_state(&record))
}

/// Markdown view of a session's state
pub fn render_state(record: &StateRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Session {}", record.session_id);
    let _ = writeln!(
        out,
        "\n**Working directory:** {}",
        record.working_directory.as_deref().unwrap_or("(not set)")
    );

    let _ = writeln!(out, "\n## Goal\n");
    let _ = writeln!(out, "{}", record.goal.as_deref().unwrap_or("(not set)"));

    let _ = writeln!(out, "\n## Tasks\n");
    if record.tasks.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for task in &record.tasks {
        let _ = writeln!(out, "- [{}] {} (id: {})", task.status, task.text, task.id);
        if let Some(result) = &task.result {
            let _ = writeln!(out, "  Result: {}", result);
        }
    }

    let _ = writeln!(out, "\n## Notes\n");
    if record.notes.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for note in &record.notes {
        let _ = writeln!(out, "- {} (id: {})", note.text, note.id);
    }

    let _ = writeln!(out, "\n## Open files");
    if record.open_files.is_empty() {
        let _ = writeln!(out, "\n(none)");
    }
    for file in &record.open_files {
        let _ = writeln!(out, "\n### {}\n\n```\n{}\n```", file.path, file.content.trim_end());
    }

    out
}

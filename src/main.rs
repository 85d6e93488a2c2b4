// Sloganforge CLI — interactive chat loop against a generation endpoint.
// Streams the reply to stdout as fragments arrive; Ctrl-C during a request
// cancels it and keeps the partial reply.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::Parser;
use log::error;

use sloganforge::{
    render_message, ChatConfig, ConversationEvent, EngineResult, HttpTransport, Outcome,
    RequestController, Role, Sha256Signer, StreamMode,
};

#[derive(Parser)]
#[command(name = "sloganforge", version, about = "Streaming slogan-writing chat client")]
struct Cli {
    /// Generation endpoint URL.
    #[arg(long, env = "SLOGANFORGE_ENDPOINT", default_value = "http://localhost:3000/api/generate")]
    endpoint: String,

    /// Response framing: raw-chunks (proxy backend) or event-framed (direct API).
    #[arg(long, env = "SLOGANFORGE_MODE", default_value = "raw-chunks")]
    mode: String,

    /// Secret shared with the backend for request signing.
    #[arg(long, env = "SLOGANFORGE_SECRET", default_value = "", hide_env_values = true)]
    secret: String,

    /// System prompt prepended to every request.
    #[arg(long, env = "SLOGANFORGE_SYSTEM_PROMPT")]
    system_prompt: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            eprintln!("sloganforge: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> EngineResult<()> {
    let mode: StreamMode = cli.mode.parse()?;
    let config = ChatConfig::new(cli.endpoint, mode).with_signing_secret(cli.secret.clone());
    config.validate()?;

    let transport = HttpTransport::new(&config)?;
    let signer = Sha256Signer::new(cli.secret);
    let mut controller = RequestController::new(config, Box::new(transport), Box::new(signer));
    controller
        .conversation_mut()
        .set_system_prompt(cli.system_prompt);

    // Echo streamed fragments as they arrive.
    controller.conversation_mut().subscribe(|event| {
        if let ConversationEvent::PendingAppended { fragment } = event {
            print!("{fragment}");
            io::stdout().flush().ok();
        }
    });

    println!("Enter product keywords (e.g. \"KFC 炸鸡 七夕\").");
    println!("Commands: /retry  /clear  /system  /html  /quit. Ctrl-C stops a running reply.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(()); // EOF
        }
        let input = line.trim_end_matches(['\n', '\r']);

        match input {
            "" => {}
            "/quit" => return Ok(()),
            "/clear" => {
                controller.conversation_mut().reset();
                println!("(cleared)");
            }
            "/html" => print_html(&controller),
            "/system" => edit_system_prompt(&mut controller)?,
            "/retry" => finish_request(run_cancellable(&mut controller, ChatRequest::Retry).await),
            _ => finish_request(run_cancellable(&mut controller, ChatRequest::Submit(input)).await),
        }
    }
}

/// One request cycle as triggered from the prompt.
enum ChatRequest<'a> {
    Submit(&'a str),
    Retry,
}

/// Run a submit or retry with a Ctrl-C watcher wired to the request's
/// cancel handle, so either can be stopped with the partial reply kept.
async fn run_cancellable(
    controller: &mut RequestController,
    request: ChatRequest<'_>,
) -> EngineResult<Outcome> {
    let handle = controller.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    let result = match request {
        ChatRequest::Submit(input) => controller.submit(input).await,
        ChatRequest::Retry => controller.retry().await,
    };
    watcher.abort();
    result
}

fn finish_request(result: EngineResult<Outcome>) {
    match result {
        Ok(Outcome::Archived) => println!(),
        Ok(Outcome::Aborted) => println!("\n(stopped, partial reply kept)"),
        Ok(Outcome::Rejected) => println!("(nothing to do)"),
        Err(e) => eprintln!("\nrequest failed: {e}"),
    }
}

/// Multi-line system-prompt editor; submit/retry stay gated while it is open.
fn edit_system_prompt(controller: &mut RequestController) -> io::Result<()> {
    controller.set_system_role_editing(true);
    println!("Enter system prompt, end with a single '.' line (empty prompt clears it):");
    let stdin = io::stdin();
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim_end() == "." {
            break;
        }
        lines.push(line.trim_end().to_string());
    }
    let prompt = lines.join("\n");
    controller
        .conversation_mut()
        .set_system_prompt(if prompt.is_empty() { None } else { Some(prompt) });
    controller.set_system_role_editing(false);
    Ok(())
}

/// Dump the conversation as rendered HTML, the way the widget would show it.
fn print_html(controller: &RequestController) {
    let messages = controller.conversation().messages();
    for (index, message) in messages.iter().enumerate() {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        println!("<!-- {role} -->");
        println!("{}", render_message(message, index == 0));
    }
}

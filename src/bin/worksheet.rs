//! worksheet — 练习题生成与组件预览命令行工具
//!
//! Usage:
//!   worksheet generate <image> [--mode replicate|generate] [--model <id>] [--out <file>]
//!   worksheet prompt <text> [--mode ...] [--model <id>] [--out <file>]
//!   worksheet render <component.jsx> [--props <json>]
//!   worksheet check <request.json>
//!   worksheet models

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tracing_subscriber::EnvFilter;

use worksheet_runtime::models::MODEL_CATALOG;
use worksheet_runtime::{
    answer_checker_value, extract_guarded_code, generate_worksheet, validate_answers, CheckAnswerRequest,
    ClientConfig, CompileRequest, Compiler, GenerateRequest, GenerationMode, ImageContent, LlmAnswerChecker,
    RenderHost, RuntimeContext, WorksheetSource,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "generate" => cmd_generate(&args[2..], false).await,
        "prompt" => cmd_generate(&args[2..], true).await,
        "render" => cmd_render(&args[2..]),
        "check" => cmd_check(&args[2..]).await,
        "models" => {
            cmd_models();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("worksheet {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"worksheet — interactive worksheets from textbook pages

USAGE:
    worksheet <COMMAND> [OPTIONS]

COMMANDS:
    generate <image>            Generate a worksheet component from a page photo
    prompt <text>               Generate a worksheet component from a text prompt
    render <component.jsx>      Compile a component and print its rendered tree
    check <request.json>        Grade answers with the validation model
    models                      List the model catalog
    version                     Show version information
    help                        Show this help message

OPTIONS:
    --config <path>             YAML or JSON client configuration
    --mode <replicate|generate> Generation mode (default: replicate)
    --model <id>                Override the generation model
    --out <path>                Write the component source to a file
    --props <json>              Root props for render

ENVIRONMENT:
    DATA_DIR                    Data directory (response cache under llm/)
    <PROVIDER>_API_KEY          Provider credentials
    RUST_LOG                    Log filter (default: info)"#
    );
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument that is neither a flag nor a flag's value.
fn positional(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
            continue;
        }
        return Some(arg);
    }
    None
}

fn load_config(args: &[String]) -> anyhow::Result<ClientConfig> {
    match flag(args, "--config") {
        Some(path) => ClientConfig::from_file(path).with_context(|| format!("loading config from {path}")),
        None => Ok(ClientConfig::from_env()),
    }
}

async fn cmd_generate(args: &[String], from_prompt: bool) -> anyhow::Result<()> {
    let input = positional(args).ok_or_else(|| anyhow!("missing {}", if from_prompt { "prompt" } else { "image" }))?;
    let config = load_config(args)?;
    let mode = match flag(args, "--mode").unwrap_or("replicate") {
        "replicate" => GenerationMode::Replicate,
        "generate" => GenerationMode::Generate,
        other => bail!("unknown mode '{other}'"),
    };
    let model_config = match flag(args, "--model") {
        Some(model) => config.model_config(model)?,
        None => config.generation_model_config()?,
    };
    let source = if from_prompt {
        WorksheetSource::Prompt(input.to_string())
    } else {
        WorksheetSource::Image(ImageContent::from_file(input).with_context(|| format!("reading image {input}"))?)
    };

    let ctx = Arc::new(RuntimeContext::from_config(&config)?);
    let generated = generate_worksheet(
        &ctx,
        GenerateRequest {
            source,
            model_config,
            mode,
        },
    )
    .await?;

    match flag(args, "--out") {
        Some(path) => {
            std::fs::write(path, &generated.app).with_context(|| format!("writing {path}"))?;
            eprintln!("Wrote component to {path}");
        }
        None => println!("{}", generated.app),
    }
    if !generated.context.trim().is_empty() {
        eprintln!("{}", generated.context.trim());
    }
    Ok(())
}

fn cmd_render(args: &[String]) -> anyhow::Result<()> {
    let path = PathBuf::from(positional(args).ok_or_else(|| anyhow!("missing component file"))?);
    let config = Arc::new(load_config(args)?);
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let code = extract_guarded_code(&text).app;
    let props = match flag(args, "--props") {
        Some(json) => serde_json::from_str(json).context("parsing --props")?,
        None => serde_json::json!({}),
    };

    let ctx = Arc::new(RuntimeContext::from_config(&config)?);
    let checker = answer_checker_value(Rc::new(LlmAnswerChecker::new(ctx.clone(), config)));
    let compiled = Compiler::new(ctx).compile(CompileRequest::new(code).with_context("checkUserAnswers", checker))?;
    let mut host = RenderHost::mount(compiled, props);
    let outcome = host.render();
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let Some(error) = outcome.error() {
        bail!("component failed to render: {error}");
    }
    Ok(())
}

async fn cmd_check(args: &[String]) -> anyhow::Result<()> {
    let path = positional(args).ok_or_else(|| anyhow!("missing request file"))?;
    let config = load_config(args)?;
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let request: CheckAnswerRequest = serde_json::from_str(&text).context("parsing check request")?;
    let ctx = Arc::new(RuntimeContext::from_config(&config)?);
    let response = validate_answers(&ctx, &config, request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_models() {
    println!("{:<30} {:<12} NAME", "ID", "PROVIDER");
    for model in MODEL_CATALOG {
        println!("{:<30} {:<12} {}", model.id, model.provider.as_str(), model.name);
    }
}

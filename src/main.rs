//! BuildBee - 多阶段代码生成编排器
//!
//! 入口：初始化日志、加载配置、选择推理引擎；`--prompt` 单次运行，否则进入行式交互。

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use buildbee::config::load_config;
use buildbee::core::{create_llm_from_config, SessionSupervisor};
use buildbee::llm::LlmClient;
use buildbee::ui::{parse_line, print_event, render_report, ReplCommand, HELP_TEXT};
use buildbee::{observability, Orchestrator, RunOptions, RunReport, RunStatus};

#[derive(Parser, Debug)]
#[command(name = "buildbee", version, about = "Plan, architect and code a project from one prompt")]
struct Cli {
    /// 直接以该需求运行一次后退出
    #[arg(short, long)]
    prompt: Option<String>,

    /// Coder 步数上限（默认取配置）
    #[arg(short = 'r', long)]
    step_ceiling: Option<usize>,

    /// 额外的配置文件
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let step_ceiling = cli.step_ceiling.unwrap_or(cfg.app.step_ceiling);
    let llm = create_llm_from_config(&cfg);
    let options = RunOptions::from_config(&cfg);
    let supervisor = Arc::new(SessionSupervisor::new());

    // Ctrl+C：有运行则取消该运行，否则退出
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if supervisor.cancel() {
                    tracing::warn!("cancellation requested");
                } else {
                    std::process::exit(130);
                }
            }
        });
    }

    if let Some(prompt) = cli.prompt {
        let report = run_once(llm, options, &supervisor, &prompt, step_ceiling).await;
        return Ok(if report.status == RunStatus::Done {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    println!("buildbee - type /help for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        match parse_line(&line) {
            ReplCommand::Run(prompt) => {
                run_once(llm.clone(), options.clone(), &supervisor, &prompt, step_ceiling).await;
            }
            ReplCommand::Help => println!("{HELP_TEXT}"),
            ReplCommand::Clear => {
                print!("\x1B[2J\x1B[1;1H");
            }
            ReplCommand::Exit => break,
            ReplCommand::Empty => {}
            ReplCommand::Unknown(cmd) => println!("Unknown command: {cmd} (try /help)"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// 执行一次运行：事件实时输出到终端，结束后打印生成文件列表
async fn run_once(
    llm: Arc<dyn LlmClient>,
    options: RunOptions,
    supervisor: &SessionSupervisor,
    prompt: &str,
    step_ceiling: usize,
) -> RunReport {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let cancel = supervisor.begin_run();
    let report = {
        let orchestrator = Orchestrator::new(llm, options).with_event_tx(tx);
        orchestrator.run(prompt, step_ceiling, cancel).await
    };
    supervisor.end_run();
    let _ = printer.await;

    print!("{}", render_report(&report));
    report
}

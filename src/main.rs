//! Weaver - 多步骤工具智能体编排核心
//!
//! 入口：初始化日志、加载配置、装配组件，进入 stdin 对话循环。

use std::io::{BufRead, Write};

use anyhow::Context;
use weaver::agent::{create_components, new_session, process_request};
use weaver::config::load_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    weaver::observability::init();

    let config = load_config(None).context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    let components = create_components(config);
    let mut session = new_session(&components);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    println!("weaver ready. Type a request, or 'exit' to quit.");
    loop {
        print!("> ");
        stdout.flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }
        match process_request(&components, &mut session, input).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    Ok(())
}

//! Aegis 诊断程序 - 逐项检查配置、后端、工具与存储
//!
//! 运行方式：
//! ```bash
//! cargo run --bin aegis-diagnostic            # 只检查配置与组件
//! cargo run --bin aegis-diagnostic -- --ping  # 额外探测一次在线后端
//! ```

use anyhow::Context;
use aegis::config::{load_config, AppConfig};
use aegis::knowledge::KnowledgeRepository;
use aegis::llm::ConversationalModel;
use aegis::storage::SqliteDeviationLog;
use aegis::{agent, observability, AuditComponents};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_with_default("warn");
    let ping = std::env::args().any(|a| a == "--ping");

    println!("🛡️  Aegis diagnostic\n");

    let cfg = match load_config(None) {
        Ok(cfg) => {
            println!("✅ Configuration loaded");
            cfg
        }
        Err(e) => {
            println!("⚠️  Configuration load failed ({e}), using defaults");
            AppConfig::default()
        }
    };
    println!("   provider:        {}", cfg.llm.provider);
    println!("   model:           {}", cfg.llm.model);
    println!(
        "   api key:         {}",
        if cfg.llm.resolve_api_key().is_some() { "set" } else { "missing" }
    );
    println!("   deviation db:    {}", cfg.storage.deviation_db.display());
    println!(
        "   knowledge vault: {}",
        cfg.knowledge
            .vault_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(baseline excerpts)".to_string())
    );
    println!("   gateway:         ws://{}{}\n", cfg.gateway.bind_addr, cfg.gateway.path);

    let model = agent::create_model_from_config(&cfg).await;
    match &model {
        Some(m) if ping => match m.ping().await {
            Ok(()) => println!("✅ Backend {} reachable", m.name()),
            Err(e) => println!("❌ Backend {} unreachable: {}", m.name(), e),
        },
        Some(m) => println!("✅ Backend {} configured (use --ping to probe)", m.name()),
        None => println!("⚠️  No live backend, simulation mode"),
    }

    let knowledge = agent::create_knowledge_from_config(&cfg)
        .context("Knowledge vault check failed")?;
    let excerpts = knowledge.search("protective eyewear protocol").await?;
    println!("✅ Knowledge repository returned {} excerpt(s)", excerpts.len());

    let deviation_log = SqliteDeviationLog::open(&cfg.storage.deviation_db)
        .context("Deviation log check failed")?;
    println!("✅ Deviation log: {} record(s)", deviation_log.count().await?);
    for d in deviation_log.recent(3).await? {
        println!("   #{} [{}] {} ({})", d.id, d.severity, d.description, d.timestamp.format("%Y-%m-%d %H:%M:%S"));
    }

    // 模拟一轮，不写入真实偏差库
    let components = AuditComponents::builder(&cfg).knowledge(knowledge).build();
    println!("\n🧰 Tools: {}", components.executor.tool_names().join(", "));
    let mut orchestrator = components.new_orchestrator("diagnostic");
    let input = "What is the protocol for sterilization?";
    let outcome = orchestrator.handle_turn(input).await;
    println!("\n▶ {input}\n{}", outcome.message);
    println!(
        "\n   thought_signature: {}",
        outcome.continuity_token.as_deref().unwrap_or("(none)")
    );

    println!("\n✅ Diagnostic complete");
    Ok(())
}

use clap::{Parser, Subcommand};
use glass_core::{db, lookup, GlassConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "glass.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store schema if needed and report its health
    Init,
    /// List servers that have logged transactions
    Servers,
    /// List clients with their retained transaction counts
    Clients,
    /// Show recent transactions for a DUID (e.g. 0x000300011234567890ab)
    Transactions {
        #[arg(long)]
        duid: String,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config
    let config = match GlassConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    match args.command {
        Command::Init => init(&config).await,
        Command::Servers => {
            let pool = db::create_read_pool(&config.store.path, 1).await?;
            for server in lookup::list_servers(&pool).await? {
                println!("{:>4}  {}", server.id, server.name);
            }
            Ok(())
        }
        Command::Clients => {
            let pool = db::create_read_pool(&config.store.path, 1).await?;
            for summary in lookup::list_clients(&pool).await? {
                let mac = summary
                    .client
                    .mac()
                    .map(|m| m.to_string())
                    .unwrap_or_default();
                println!("{:>5}  {:<17}  {}", summary.transactions, mac, summary.client);
            }
            Ok(())
        }
        Command::Transactions { duid, limit } => {
            let pool = db::create_read_pool(&config.store.path, 1).await?;
            let rows = lookup::transactions_for_duid(&pool, &duid, limit).await?;
            if rows.is_empty() {
                println!("No transactions for {}", duid);
            }
            for row in rows {
                let response = row.response_type.as_deref().unwrap_or("(no response)");
                println!(
                    "{}  {} -> {}",
                    row,
                    row.request_type.as_deref().unwrap_or("?"),
                    response
                );
                if let Some(request) = &row.request {
                    println!("    request:  {}", request);
                }
                if let Some(reply) = &row.response {
                    println!("    response: {}", reply);
                }
            }
            Ok(())
        }
    }
}

async fn init(config: &GlassConfig) -> anyhow::Result<()> {
    let mut conn = match db::connect_writer(&config.store.path).await {
        Ok(c) => c,
        Err(e) => {
            println!("❌ Cannot open store {}: {}", config.store.path, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::ensure_schema(&mut conn).await {
        println!("❌ Schema creation failed: {}", e);
        std::process::exit(1);
    }

    match db::health_check(&mut conn).await {
        Ok((sqlite, schema)) => {
            println!("✅ SQLite version: {}", sqlite);
            println!("✅ Schema version: {}", schema);
        }
        Err(e) => {
            println!("❌ Health check failed: {}", e);
            std::process::exit(1);
        }
    }

    println!("✅ Looking glass store ready at {}", config.store.path);
    Ok(())
}

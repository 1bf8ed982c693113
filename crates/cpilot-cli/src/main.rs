//! Operational CLI: run migrations, trigger a catalog sync for a tenant, and
//! inspect work orders, without going through the HTTP API.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use cpilot_bigcommerce::{BigCommerceClient, Credentials, HttpSettings};
use cpilot_core::SubscriptionPlan;

#[derive(Debug, Parser)]
#[command(name = "cpilot-cli")]
#[command(about = "Catalog Pilot command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations.
    Migrate,
    /// Run a full catalog sync for a tenant.
    Sync {
        #[arg(long)]
        user_id: i64,
    },
    /// List a tenant's work orders.
    WorkOrders {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        include_archived: bool,
    },
    /// Show one work order in full.
    ShowOrder {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = cpilot_core::load_app_config_from_env()?;
    let pool = cpilot_db::connect_pool(
        &config.database_url,
        cpilot_db::PoolConfig::from_app_config(&config),
    )
    .await
    .context("failed to connect to database")?;

    match cli.command {
        Commands::Migrate => {
            let applied = cpilot_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Sync { user_id } => run_sync(&pool, &config, user_id).await?,
        Commands::WorkOrders {
            user_id,
            include_archived,
        } => {
            let orders = cpilot_db::list_work_orders(&pool, user_id, include_archived, 200).await?;
            if orders.is_empty() {
                println!("no work orders for user {user_id}");
            }
            for order in orders {
                println!(
                    "#{id} [{status}] {title} — {updates} update(s), created {created}",
                    id = order.id,
                    status = order.status,
                    title = order.title,
                    updates = order.updates().len(),
                    created = order.created_at.to_rfc3339(),
                );
            }
        }
        Commands::ShowOrder { id } => {
            let Some(order) = cpilot_db::get_work_order(&pool, id).await? else {
                bail!("work order {id} not found");
            };
            println!("#{} {} [{}]", order.id, order.title, order.status);
            println!("  user: {}", order.user_id);
            if let Some(at) = order.scheduled_at {
                println!("  scheduled at: {}", at.to_rfc3339());
            }
            if let Some(at) = order.executed_at {
                println!("  executed at: {}", at.to_rfc3339());
            }
            if let Some(message) = &order.error_message {
                println!("  error: {message}");
            }
            for update in order.updates() {
                println!(
                    "  - product {} ({}) regular {:?} sale {:?}",
                    update.product_id,
                    update.product_name,
                    update.new_regular_price,
                    update.new_sale_price,
                );
            }
            if let Some(snapshots) = order.snapshots() {
                println!("  captured snapshots: {}", snapshots.len());
            }
        }
    }

    Ok(())
}

/// One-shot sync mirroring the server's behavior: plan ceiling, embedded
/// variants with a per-product fallback, full replace.
async fn run_sync(
    pool: &sqlx::PgPool,
    config: &cpilot_core::AppConfig,
    user_id: i64,
) -> anyhow::Result<()> {
    let Some(settings) = cpilot_db::get_api_settings(pool, user_id).await? else {
        bail!("user {user_id} has no BigCommerce credentials configured");
    };

    let plan = cpilot_db::get_user_plan(pool, user_id)
        .await?
        .map_or(SubscriptionPlan::Trial, |p| SubscriptionPlan::from_db(&p));
    let limit = plan.product_limit();

    let client = BigCommerceClient::new(
        &HttpSettings::from_app_config(config),
        Credentials {
            store_hash: settings.store_hash,
            access_token: settings.access_token,
            client_id: settings.client_id,
        },
    )?;

    println!("syncing user {user_id} on plan {} (limit {limit})", plan.as_str());

    let catalog = client
        .fetch_all_products(config.sync_page_size, config.sync_inter_page_delay_ms, Some(limit))
        .await?;

    let mut synced = Vec::with_capacity(catalog.products.len());
    for product in catalog.products {
        let variants = match product.variants.clone() {
            Some(variants) => variants,
            None => client.fetch_variants(product.id).await?,
        };
        synced.push(product.into_synced(variants));
    }

    let (product_count, variant_count) = cpilot_db::replace_products(pool, user_id, &synced).await?;
    let is_limited = (catalog.total_available as usize) > limit;

    println!(
        "stored {product_count} product(s) / {variant_count} variant(s); \
         store reports {total} total{limited}",
        total = catalog.total_available,
        limited = if is_limited { " (truncated by plan limit)" } else { "" },
    );
    Ok(())
}

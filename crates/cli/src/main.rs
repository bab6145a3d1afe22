use anyhow::Context;
use api_shared::dto::{
    DeferralRes, DonorStagePageRes, DuplicateCheckRes, HospitalRequestDto, InventoryRes,
    MedicalReviewCountsDto, PendingDonationsRes,
};
use bloodbank_core::config::{
    page_size_from_env_value, required_env_value, session_ttl_from_env_value,
    store_timeout_from_env_value,
};
use bloodbank_core::constants::PASSWORD_HASH_ITERATIONS;
use bloodbank_core::eligibility::DuplicateQuery;
use bloodbank_core::users::hash_password;
use bloodbank_core::{
    CoreConfig, DonorService, HospitalRequestService, InventoryService, RecordStore, RetryPolicy,
    StageQueueParams, SupabaseStore,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bloodbank")]
#[command(about = "Blood bank donor workflow CLI")]
struct Cli {
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List donors with their current stage and status
    Stages {
        /// all, incoming, active, today, pending, completed, deferred, or a stage name
        #[arg(long)]
        status: Option<String>,
        /// Donor id or part of a name
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        per_page: Option<usize>,
    },
    /// List pending donations with their pipeline label
    Pending {
        #[arg(long)]
        page: Option<usize>,
    },
    /// Medical history review counts
    MedicalSummary {
        /// incoming, approved or declined
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        page: Option<usize>,
    },
    /// Deferral state of one donor
    Deferral {
        donor_id: String,
    },
    /// Look for an earlier registration of the same person
    CheckDuplicate {
        #[arg(long)]
        surname: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        middle_name: Option<String>,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        birthdate: String,
    },
    /// Blood unit inventory counts
    Inventory,
    /// Hospital requests, most urgent first
    Requests {
        #[arg(long)]
        status: Option<String>,
    },
    /// Hash a password for seeding the users table
    HashPassword {
        password: String,
    },
}

struct Services {
    donors: DonorService,
    inventory: InventoryService,
    requests: HospitalRequestService,
}

/// Resolves configuration from the environment, the same variables the server reads.
///
/// The CLI never stores uploads, so the upload directory falls back to the working directory.
fn services() -> anyhow::Result<Services> {
    let upload_dir = match std::env::var("BLOODBANK_UPLOAD_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => std::env::current_dir()?,
    };
    let cfg = Arc::new(CoreConfig::new(
        upload_dir,
        page_size_from_env_value(std::env::var("BLOODBANK_PAGE_SIZE").ok())?,
        session_ttl_from_env_value(std::env::var("BLOODBANK_SESSION_TTL_MINUTES").ok())?,
        store_timeout_from_env_value(std::env::var("BLOODBANK_STORE_TIMEOUT_SECS").ok())?,
    )?);

    let url = required_env_value("SUPABASE_URL", std::env::var("SUPABASE_URL").ok())?;
    let key = required_env_value("SUPABASE_API_KEY", std::env::var("SUPABASE_API_KEY").ok())?;
    let store: Arc<dyn RecordStore> = Arc::new(SupabaseStore::new(
        &url,
        &key,
        cfg.store_timeout(),
        RetryPolicy::default(),
    )?);

    Ok(Services {
        donors: DonorService::new(cfg.clone(), store.clone()),
        inventory: InventoryService::new(store.clone()),
        requests: HospitalRequestService::new(store),
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bloodbank=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let now = Utc::now();

    if let Commands::HashPassword { password } = &cli.command {
        println!("{}", hash_password(password, PASSWORD_HASH_ITERATIONS)?);
        return Ok(());
    }
    let svc = services().context("failed to configure the record store")?;

    match cli.command {
        Commands::Stages {
            status,
            search,
            page,
            per_page,
        } => {
            let params = StageQueueParams {
                status,
                search,
                page,
                per_page,
            };
            let page = svc.donors.stage_queue(params, now).await?;
            let res = DonorStagePageRes::from(&page);
            if cli.json {
                return print_json(&res);
            }
            if res.donors.is_empty() {
                println!("No records found.");
            }
            for d in &res.donors {
                println!(
                    "{:<8} {:<32} {:<13} {:<10} {}",
                    d.donor_id,
                    d.full_name,
                    d.current_stage,
                    d.status,
                    d.deferral_reason.as_deref().unwrap_or("")
                );
            }
            println!(
                "Page {} of {} ({} donors)",
                res.pagination.page, res.pagination.total_pages, res.pagination.total_records
            );
        }
        Commands::Pending { page } => {
            let page = svc.donors.pending_donations(page, None).await?;
            let res = PendingDonationsRes::from(&page);
            if cli.json {
                return print_json(&res);
            }
            if res.donations.is_empty() {
                println!("No records found.");
            }
            for d in &res.donations {
                println!(
                    "{:<10} {}, {:<20} {:<10} {}",
                    d.donor_number, d.surname, d.first_name, d.donor_type, d.status
                );
            }
            println!(
                "Page {} of {} ({} donations)",
                res.pagination.page, res.pagination.total_pages, res.pagination.total_records
            );
        }
        Commands::MedicalSummary { status, page } => {
            let summary = svc
                .donors
                .medical_review_summary(status.as_deref(), page, None)
                .await?;
            let counts = MedicalReviewCountsDto::from(&summary.counts);
            if cli.json {
                return print_json(&counts);
            }
            println!("Incoming: {}", counts.incoming);
            println!("Approved: {}", counts.approved);
            println!("Declined: {}", counts.declined);
            for row in &summary.rows.items {
                println!("{:<8} {:<32} {}", row.donor_id, row.full_name, row.category.as_str());
            }
        }
        Commands::Deferral { donor_id } => {
            let status = svc.donors.check_deferral(&donor_id).await?;
            let res = DeferralRes::from(&status);
            if cli.json {
                return print_json(&res);
            }
            match (res.is_deferred, res.is_refused) {
                (_, true) => println!("Refused: {}", res.reason.unwrap_or_default()),
                (true, _) => println!(
                    "Deferred ({}): {}",
                    res.deferral_type.unwrap_or_default(),
                    res.reason.unwrap_or_default()
                ),
                _ if !res.has_exam => println!("No physical examination on record."),
                _ => println!("Not deferred."),
            }
        }
        Commands::CheckDuplicate {
            surname,
            first_name,
            middle_name,
            birthdate,
        } => {
            let query = DuplicateQuery::from_form(
                Some(surname.as_str()),
                Some(first_name.as_str()),
                middle_name.as_deref(),
                Some(birthdate.as_str()),
            )?;
            let found = svc.donors.check_duplicate(&query, now).await?;
            let res = DuplicateCheckRes::from(found.as_ref());
            if cli.json {
                return print_json(&res);
            }
            match res.donor {
                Some(d) => {
                    println!("Existing donor {} ({})", d.full_name, d.donor_number);
                    println!("Registered {}", d.time_description);
                    println!("{}: {}", d.status_message, d.reason);
                    if !d.suggestion.is_empty() {
                        println!("{}", d.suggestion);
                    }
                }
                None => println!("No earlier registration found."),
            }
        }
        Commands::Inventory => {
            let snapshot = svc.inventory.snapshot(now).await?;
            let res = InventoryRes::from(&snapshot);
            if cli.json {
                return print_json(&res);
            }
            println!("In stock: {}", res.in_stock);
            println!("Buffer: {}", res.buffer.len());
            println!("Donors received: {}", res.donors_received);
            for count in &res.by_blood_type {
                println!("  {:<4} {}", count.blood_type, count.count);
            }
        }
        Commands::Requests { status } => {
            let requests = svc.requests.list(status.as_deref(), now).await?;
            let rows: Vec<HospitalRequestDto> =
                requests.iter().map(HospitalRequestDto::from).collect();
            if cli.json {
                return print_json(&rows);
            }
            if rows.is_empty() {
                println!("No records found.");
            }
            for r in &rows {
                println!(
                    "[{}] {:<12} {:<24} {:<4} {}",
                    r.priority_level, r.request_reference, r.hospital, r.blood_type, r.time_remaining
                );
            }
        }
        Commands::HashPassword { .. } => {}
    }

    Ok(())
}

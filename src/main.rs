use clap::Parser;
use project_costing::config::cli::{Command, MemoAction};
use project_costing::core::allocator::PaymentAllocator;
use project_costing::core::memo::{mark_paid, submit_memo, MemoBuilder, MemoItemRequest};
use project_costing::core::wizard::check_step;
use project_costing::core::{DraftStorage, ProjectApi};
use project_costing::utils::error::ErrorSeverity;
use project_costing::utils::money::{format_rm, parse_amount};
use project_costing::utils::logger;
use project_costing::utils::validation::{validate_required_field, Validate};
use project_costing::{
    assemble, CliConfig, HttpProjectApi, LocalDraftStorage, PortalSettings, ProjectDraft,
    ProjectWizard, Result, WizardStep,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let settings = match cli.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if settings.json_logs {
        logger::init_json_logger(settings.log_level.as_deref());
    } else {
        logger::init_cli_logger(cli.verbose, settings.log_level.as_deref());
    }

    tracing::info!("Starting project-costing CLI");
    tracing::debug!("Resolved settings: api={} drafts={}", settings.api_base_url, settings.draft_dir);

    // 驗證配置
    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let storage = LocalDraftStorage::new(settings.draft_dir.clone());

    if let Err(e) = run(cli.command, &settings, &storage).await {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼，草稿未寫入也算失敗
        let exit_code = match e.severity() {
            ErrorSeverity::Low | ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run(command: Command, settings: &PortalSettings, storage: &LocalDraftStorage) -> Result<()> {
    match command {
        Command::Summary { draft } => {
            let loaded = storage.load_draft(&draft).await?;
            print_summary(&loaded, &PaymentAllocator::new());
        }
        Command::Edit {
            draft,
            new,
            changes,
            out,
        } => {
            let mut loaded = if new {
                ProjectDraft::new()
            } else {
                storage.load_draft(&draft).await?
            };

            let consultants = if changes.add_consultants.is_empty() {
                Vec::new()
            } else {
                HttpProjectApi::new(settings)?.consultant_list().await?
            };
            changes.apply(&mut loaded, &consultants)?;

            let target = out.unwrap_or(draft);
            storage.save_draft(&target, &loaded).await?;
            print_summary(&loaded, &PaymentAllocator::new());
            println!("📁 Draft saved to: {}", target);
        }
        Command::Allocate {
            draft,
            received,
            allocations,
            bank_details,
            auto,
            out,
        } => {
            let mut loaded = storage.load_draft(&draft).await?;
            let mut allocator = PaymentAllocator::new();

            if let Some(received) = received {
                allocator.set_total_payment_received(&mut loaded, parse_amount(&received))?;
            }
            if auto {
                allocator.auto_allocate(&mut loaded)?;
            }
            for arg in &allocations {
                allocator.allocate(&mut loaded, arg.section, arg.index, arg.amount)?;
            }
            for arg in &bank_details {
                allocator.set_bank_detail(&mut loaded, arg.section, arg.index, arg.field, &arg.value)?;
            }

            let target = out.unwrap_or(draft);
            storage.save_draft(&target, &loaded).await?;
            print_summary(&loaded, &allocator);
            println!("📁 Draft saved to: {}", target);
        }
        Command::Submit { draft, dry_run } => {
            let loaded = storage.load_draft(&draft).await?;
            for step in WizardStep::ALL {
                check_step(&loaded, step)?;
            }

            if dry_run {
                println!("{}", serde_json::to_string_pretty(&assemble(&loaded))?);
                return Ok(());
            }

            validate_required_field("access_token", &settings.access_token)?;
            let api = HttpProjectApi::new(settings)?;
            let mut wizard = ProjectWizard::resume(api, loaded);
            let response = wizard.submit().await?;
            storage.remove_draft(&draft).await?;

            println!("✅ Project created successfully!");
            if let Some(id) = response.id {
                println!("🆔 Project id: {}", id);
            }
        }
        Command::Reference => {
            let api = HttpProjectApi::new(settings)?;
            let reference = ProjectWizard::new(api).load_reference_data().await?;

            println!("Consultants ({}):", reference.consultants.len());
            for c in &reference.consultants {
                let bank = match &c.bank {
                    Some(bank) if bank.is_complete() => "bank ✓",
                    _ => "bank ✗",
                };
                println!("  {:>5}  {:<10} {:<30} {}", c.id, c.staff_id, c.name, bank);
            }
            println!("Clients ({}):", reference.clients.len());
            for client in &reference.clients {
                println!("  {:>5}  {}", client.id, client.company_name);
            }
            println!("SDG goals ({}):", reference.sdg_goals.len());
            for goal in &reference.sdg_goals {
                println!("  {:>5}  {}", goal.id, goal.name);
            }
        }
        Command::Memo { action } => run_memo(action, settings).await?,
    }
    Ok(())
}

async fn run_memo(action: MemoAction, settings: &PortalSettings) -> Result<()> {
    validate_required_field("access_token", &settings.access_token)?;
    let api = HttpProjectApi::new(settings)?;

    match action {
        MemoAction::Create {
            project_id,
            project_code,
            from,
            to,
            subject,
            description,
            date,
            reference_no,
            items,
            dry_run,
        } => {
            let requests: Vec<MemoItemRequest> =
                serde_json::from_str(&tokio::fs::read_to_string(&items).await?)?;
            let detail = api.cost_detail(project_id).await?;

            let mut builder = MemoBuilder::new(&project_code, &detail)
                .from(&from)
                .to(&to)
                .subject(&subject)
                .description(&description);
            if let Some(date) = date {
                builder = builder.date(date);
            }
            if let Some(reference_no) = reference_no {
                builder = builder.with_reference_no(&reference_no);
            }
            for request in requests {
                builder.add_request(request)?;
            }
            let memo = builder.build()?;

            if dry_run {
                println!("{}", serde_json::to_string_pretty(&memo)?);
                return Ok(());
            }

            let response = submit_memo(&api, &memo).await?;
            println!("✅ Memo {} created ({})", memo.reference_no, format_rm(memo.total()));
            if let Some(id) = response.id {
                println!("🆔 Memo id: {}", id);
            }
        }
        MemoAction::List { project_id } => {
            let memos = api.memos_by_project(project_id).await?;
            println!("Memos ({}):", memos.len());
            for memo in &memos {
                println!(
                    "  {:>5}  {:<40} {:>16}  {:?}",
                    memo.id,
                    memo.reference_no,
                    format_rm(memo.total()),
                    memo.status
                );
            }
        }
        MemoAction::Pay { memo_id } => {
            let record = mark_paid(&api, memo_id).await?;
            println!("💰 Memo {} is paid ({})", record.reference_no, format_rm(record.total()));
        }
    }
    Ok(())
}

fn print_summary(draft: &ProjectDraft, allocator: &PaymentAllocator) {
    let totals = draft.totals;
    let title = if draft.details.project_title.is_empty() {
        "(untitled project)"
    } else {
        draft.details.project_title.as_str()
    };

    println!("📋 {} {}", draft.details.project_code, title);
    println!("  A. Consultant fees   {:>16}", format_rm(totals.consultant_payments_total));
    println!("  B. Direct costs      {:>16}", format_rm(totals.direct_cost_total));
    println!("  C. Finder reward     {:>16}", format_rm(totals.finder_reward_total));
    println!("  D. Management fee    {:>16}", format_rm(totals.management_fee_total));
    if draft.sst_enabled {
        println!("  E. SST ({}%)          {:>16}", draft.sst_percentage, format_rm(totals.sst_amount));
    }
    println!("  Total project cost   {:>16}", format_rm(totals.total_cost));
    println!();

    println!(
        "💰 Received {}  allocated {}  remaining {}  ({}%, {:?})",
        format_rm(draft.total_payment_received),
        format_rm(PaymentAllocator::allocated_total(draft)),
        format_rm(PaymentAllocator::remaining_to_allocate(draft)),
        PaymentAllocator::progress_percent(draft),
        PaymentAllocator::status(draft)
    );
    for summary in PaymentAllocator::section_summaries(draft) {
        if summary.max > 0.0 {
            println!(
                "  {:<36} {:>16} / {}",
                summary.title,
                format_rm(summary.allocated),
                format_rm(summary.max)
            );
        }
    }

    let missing = PaymentAllocator::incomplete_bank_details(draft);
    if !missing.is_empty() {
        println!("⚠️  Missing bank details: {}", missing.join(", "));
    }
    if allocator.has_errors() {
        println!("⚠️  Rejected input:");
        for (field, message) in allocator.errors() {
            println!("    {}: {}", field, message);
        }
    }
}

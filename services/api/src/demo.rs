use crate::infra::{build_engine, EngineService};
use chrono::Utc;
use clap::Args;
use consent_rewards::config::EngineConfig;
use consent_rewards::error::AppError;
use consent_rewards::workflows::consent::{
    bootstrap_partners, CategoryId, DatasetUpload, PartnerId, PartnerStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Bootstrap partner to walk through (1-3)
    #[arg(long, default_value_t = 1)]
    pub(crate) partner: u64,
    /// Simulated verification delay in milliseconds
    #[arg(long, default_value_t = 250)]
    pub(crate) verification_delay_ms: u64,
    /// Persist demo state under this directory instead of memory
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
}

fn sample_dataset(category: &CategoryId) -> DatasetUpload {
    let slug = category
        .as_str()
        .to_ascii_lowercase()
        .replace(|c: char| !c.is_ascii_alphanumeric(), "_");
    let mut body = String::from("date,detail\n");
    for day in 1..=6 {
        body.push_str(&format!("2025-03-{day:02},{} sample {day}\n", category));
    }
    DatasetUpload::new(format!("{slug}.csv"), category.clone(), body)
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        partner,
        verification_delay_ms,
        data_dir,
    } = args;

    let config = EngineConfig {
        data_dir,
        verification_delay: Duration::from_millis(verification_delay_ms),
        ..EngineConfig::default()
    };
    let started = Utc::now();
    let engine = build_engine(&config)?;
    engine.seed_partners(bootstrap_partners());
    let engine = Arc::new(engine);

    let outcome = walk_through(&engine, PartnerId(partner), verification_delay_ms).await;
    engine.flushed().await;
    println!(
        "\nFinished in {} ms",
        (Utc::now() - started).num_milliseconds()
    );
    outcome
}

async fn walk_through(
    engine: &Arc<EngineService>,
    partner_id: PartnerId,
    verification_delay_ms: u64,
) -> Result<(), AppError> {
    let view = engine.partner(partner_id)?;
    let reward = view.partner.reward.clone();

    println!("Consent rewards demo");
    println!(
        "- {} offers {} ({}) for: {}",
        view.partner.name,
        reward.title,
        reward.value,
        view.partner
            .required_categories
            .iter()
            .map(CategoryId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(guidance) = &view.guidance {
        println!("  Next step: {guidance}");
    }

    if view.partner.status == PartnerStatus::Active {
        println!("  Partner already active from a previous run");
    } else {
        println!("\nSharing");
        for category in &view.partner.required_categories {
            let changed = engine.set_category_active(category, true)?;
            println!(
                "- {category}: {}",
                if changed { "enabled" } else { "already enabled" }
            );
        }

        println!("\nUploads");
        let mut selected = Vec::new();
        for category in &view.partner.required_categories {
            let receipt = engine.upload_dataset(sample_dataset(category)).await?;
            println!(
                "- {} -> {:?} ({} records){}",
                receipt.record.file_name,
                receipt.record.outcome,
                receipt.record.record_count,
                receipt
                    .rationale
                    .as_deref()
                    .map(|reason| format!(": {reason}"))
                    .unwrap_or_default()
            );
            selected.push(receipt.record.id);
        }

        let eligibility = engine.eligibility(partner_id)?;
        match eligibility.guidance() {
            Some(guidance) => {
                println!("  Still blocked: {guidance}");
                return Ok(());
            }
            None => println!("  Eligible for acceptance"),
        }

        println!("\nVerification");
        let handle = engine.request_acceptance(partner_id, &selected)?;
        println!(
            "- Requested (token {}), waiting up to {verification_delay_ms} ms",
            handle.ticket().token
        );
        handle.settled().await;
        let settled = engine.partner(partner_id)?;
        println!(
            "- {} is now {} ({:?})",
            settled.partner.name, settled.partner.status, settled.partner.verification_status
        );
        if settled.partner.status != PartnerStatus::Active {
            println!("  Verification did not pass; upload fresh datasets and retry");
            return Ok(());
        }
    }

    println!("\nRedemption");
    let first = engine.redeem(&reward.id)?;
    println!(
        "- Voucher {} issued {}",
        first.voucher.code,
        first.voucher.issued_at.format("%Y-%m-%d %H:%M UTC")
    );
    let again = engine.redeem(&reward.id)?;
    println!(
        "- Redeeming again returns {} ({})",
        again.voucher.code,
        if again.newly_issued {
            "new"
        } else {
            "unchanged"
        }
    );

    let dashboard = engine.dashboard();
    println!("\nDashboard");
    println!(
        "- {} active partners | {} pending offers | {} of {} uploads valid | {} redeemed",
        dashboard.active_partners,
        dashboard.pending_offers,
        dashboard.successful_uploads,
        dashboard.uploads,
        dashboard.redeemed_count
    );
    println!("Notifications ({} unread):", dashboard.unread_notifications);
    for entry in engine.notifications() {
        println!("  - [{:?}] {}: {}", entry.category, entry.title, entry.message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_dataset_is_a_csv_named_after_the_category() {
        let upload = sample_dataset(&CategoryId::new("Health & Fitness"));
        assert_eq!(upload.file_name, "health___fitness.csv");
        assert_eq!(upload.file_type(), "text/csv");
    }

    #[tokio::test]
    async fn demo_walks_a_partner_to_a_voucher() {
        let dir = tempfile::tempdir().expect("temp dir");
        let args = DemoArgs {
            partner: 2,
            verification_delay_ms: 0,
            data_dir: Some(dir.path().to_path_buf()),
        };

        run_demo(args).await.expect("demo completes");

        let rerun = DemoArgs {
            partner: 2,
            verification_delay_ms: 0,
            data_dir: Some(dir.path().to_path_buf()),
        };
        run_demo(rerun).await.expect("demo is repeatable");
    }

    #[tokio::test]
    async fn unknown_partner_is_an_error() {
        let args = DemoArgs {
            partner: 99,
            verification_delay_ms: 0,
            data_dir: None,
        };

        assert!(run_demo(args).await.is_err());
    }
}

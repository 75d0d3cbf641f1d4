//! Albor Space DU Scheduler Driver
//!
//! Runs the UE scheduler in real time at the slot cadence of the configured
//! numerology, with emulated buffer reports and HARQ/CRC feedback.

mod config;
mod feedback;

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::{DuCellIndex, DuUeIndex, LcgId, Lcid, RanSliceId, Rnti, SlotPoint};
use interfaces::{
    DlBufferStateIndication, IndicationSender, SchedIndication, UeCreationRequest, UlBsrIndication,
};
use scheduler::UeScheduler;

use config::{GnbConfig, TrafficConfig, UeConfig};
use feedback::FeedbackEmulator;

/// Albor Space DU scheduler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "du_sched.yml")]
    config: String,

    /// Log level (trace, debug, info, warn, error), overrides the configuration file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Stop after this many slots, run until Ctrl-C when absent
    #[arg(long)]
    nof_slots: Option<u64>,
}

/// Grants accumulated between two statistics reports
#[derive(Debug, Default)]
struct SlotStats {
    nof_slots: u64,
    dl_grants: u64,
    ul_grants: u64,
    dl_bytes: u64,
    ul_bytes: u64,
    dl_retxs: u64,
}

// The scheduler is confined to the main task
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = GnbConfig::from_yaml_file(&args.config)?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&cfg.log.all_level);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Albor Space DU scheduler");
    info!("Configuration file: {}", args.config);

    let scs = cfg.scs()?;
    let mut sched = UeScheduler::new(cfg.expert_cfg.clone())?;
    let mut cells = Vec::with_capacity(cfg.cells.len());
    for (i, cell) in cfg.cells.iter().enumerate() {
        let cell_index = DuCellIndex::try_from(u8::try_from(i)?)?;
        let cell_cfg = cell.to_cell_configuration(cell_index)?;
        sched.add_cell(&cell_cfg)?;
        if let Some(params) = sched.cell_params(cell_index) {
            info!("Cell configuration:");
            info!("  Index: {}", cell_index);
            info!("  Bandwidth: {} MHz ({} RBs)", cell.channel_bandwidth_mhz, params.nof_rbs);
            info!("  Subcarrier spacing: {} kHz", cell.common_scs);
            info!("  Duplex: {}", if params.tdd.is_some() { "TDD" } else { "FDD" });
        }
        cells.push(cell_index);
    }

    let tx = sched.indication_sender();
    let ues = attach_ues(&cfg.ues, &tx)?;
    info!("{} UEs attached", ues.len());

    let traffic_handle = {
        let tx = tx.clone();
        let traffic = cfg.traffic.clone();
        let ues = ues.clone();
        tokio::spawn(async move { report_buffers(traffic, ues, tx).await })
    };

    let slot_duration = Duration::from_micros(u64::from(scs.slot_duration_us()));
    let mut ticker = tokio::time::interval(slot_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let stats_period_slots = (cfg.log.stats_period_s * 1_000_000 / slot_duration.as_micros().max(1) as u64).max(1);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut feedback = FeedbackEmulator::new(cfg.traffic.nack_period);
    let mut stats = SlotStats::default();
    let mut slot = SlotPoint::from_count(scs, 0);
    let mut nof_slots = 0u64;
    info!("Slot clock running every {:?}", slot_duration);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            _ = ticker.tick() => {}
        }

        for &cell_index in &cells {
            let res = sched.run_slot(slot, cell_index);
            stats.dl_grants += res.dl_grants.len() as u64;
            stats.ul_grants += res.ul_grants.len() as u64;
            stats.dl_bytes += res.dl_grants.iter().map(|g| u64::from(g.tbs_bytes)).sum::<u64>();
            stats.ul_bytes += res.ul_grants.iter().map(|g| u64::from(g.tbs_bytes)).sum::<u64>();
            stats.dl_retxs += res.dl_grants.iter().filter(|g| g.nof_retxs > 0).count() as u64;
            if !res.dl_grants.is_empty() || !res.ul_grants.is_empty() {
                debug!(
                    "Cell {} slot {}: {} PDSCHs ({} RBs), {} PUSCHs ({} RBs), {} PUCCHs",
                    cell_index,
                    slot,
                    res.dl_grants.len(),
                    res.nof_dl_rbs(),
                    res.ul_grants.len(),
                    res.nof_ul_rbs(),
                    res.pucchs.len()
                );
            }
            feedback.on_sched_result(res, slot, cell_index, &tx);
        }
        stats.nof_slots += 1;

        if stats.nof_slots >= stats_period_slots {
            report_stats(&stats, &sched, &feedback, slot_duration);
            stats = SlotStats::default();
        }

        slot += 1;
        nof_slots += 1;
        if args.nof_slots.is_some_and(|max| nof_slots >= max) {
            info!("Reached {} slots", nof_slots);
            break;
        }
    }

    // Shutdown
    info!("Shutting down DU scheduler");
    traffic_handle.abort();
    if stats.nof_slots > 0 {
        report_stats(&stats, &sched, &feedback, slot_duration);
    }

    info!("DU scheduler shutdown complete");
    Ok(())
}

/// Register the configured UEs with the scheduler, indexed in declaration order
fn attach_ues(ues: &[UeConfig], tx: &IndicationSender) -> Result<Vec<(DuUeIndex, UeConfig)>> {
    let mut attached = Vec::with_capacity(ues.len());
    for (i, ue) in ues.iter().enumerate() {
        let ue_index = DuUeIndex::try_from(u16::try_from(i)?)?;
        tx.try_push(SchedIndication::UeCreation(UeCreationRequest {
            ue_index,
            crnti: Rnti::new(ue.rnti),
            pcell_index: DuCellIndex::try_from(ue.cell)?,
            slice_id: RanSliceId::try_from(ue.slice)?,
        }))?;
        attached.push((ue_index, *ue));
    }
    Ok(attached)
}

/// Periodically refill the DL and UL buffers of every UE
async fn report_buffers(traffic: TrafficConfig, ues: Vec<(DuUeIndex, UeConfig)>, tx: IndicationSender) {
    let mut interval = tokio::time::interval(Duration::from_millis(traffic.report_period_ms.max(1)));
    loop {
        interval.tick().await;
        for (ue_index, ue) in &ues {
            let Ok(cell_index) = DuCellIndex::try_from(ue.cell) else {
                continue;
            };
            let dl = SchedIndication::DlBufferState(DlBufferStateIndication {
                ue_index: *ue_index,
                lcid: Lcid::new(Lcid::MIN_DRB),
                bs: traffic.dl_bytes,
            });
            let ul = SchedIndication::UlBsr(UlBsrIndication {
                cell_index,
                ue_index: *ue_index,
                crnti: Rnti::new(ue.rnti),
                lcg_id: LcgId::new(0),
                nof_bytes: traffic.ul_bytes,
            });
            for ind in [dl, ul] {
                if let Err(e) = tx.push(ind).await {
                    warn!("Traffic generator stopped: {}", e);
                    return;
                }
            }
        }
    }
}

fn report_stats(stats: &SlotStats, sched: &UeScheduler, feedback: &FeedbackEmulator, slot_duration: Duration) {
    let elapsed_s = (stats.nof_slots as f64 * slot_duration.as_secs_f64()).max(f64::EPSILON);
    let events = sched.event_stats();

    info!("Scheduler Statistics ({} slots):", stats.nof_slots);
    info!(
        "  DL: {} grants, {} retxs, {:.2} Mbps",
        stats.dl_grants,
        stats.dl_retxs,
        stats.dl_bytes as f64 * 8.0 / elapsed_s / 1e6
    );
    info!(
        "  UL: {} grants, {:.2} Mbps",
        stats.ul_grants,
        stats.ul_bytes as f64 * 8.0 / elapsed_s / 1e6
    );
    info!(
        "  HARQ-ACK: {} ACKs, {} NACKs; CRC: {} OK, {} KO",
        events.dl_acks, events.dl_nacks, events.ul_crc_ok, events.ul_crc_ko
    );
    if events.unmatched_feedback > 0 || events.unknown_ue > 0 || feedback.nof_dropped() > 0 {
        warn!(
            "  Discarded: {} unmatched feedback, {} unknown UE, {} dropped",
            events.unmatched_feedback,
            events.unknown_ue,
            feedback.nof_dropped()
        );
    }
}

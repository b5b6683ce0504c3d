mod link;

use anyhow::Result;
use clap::Parser;
use glam::{Quat, Vec3};
use log::info;
use tether::{
    AuthorityRole, Delivery, Endpoint, IntervalMode, Pose, PoseAccessor, SyncConfig,
    SyncController, TickContext, packet_queue,
};

use link::{LinkConditions, LoopbackLink};

#[derive(Parser)]
#[command(name = "tether-demo")]
#[command(about = "Transform sync over a simulated lossy link")]
struct Args {
    #[arg(long, default_value_t = 10.0, help = "Simulated seconds to run")]
    duration: f32,

    #[arg(long, default_value_t = 0.1, help = "Send interval in seconds")]
    interval: f32,

    #[arg(long, help = "Send updates unreliably")]
    unreliable: bool,

    #[arg(long, default_value_t = 0.0, help = "Extrapolation span in seconds")]
    extrapolation: f32,

    #[arg(long, default_value_t = 0.0, help = "Teleport distance, 0 disables")]
    teleport_threshold: f32,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

struct TrackedPose(Pose);

impl PoseAccessor for TrackedPose {
    fn pose(&self) -> Pose {
        self.0
    }

    fn set_pose(&mut self, pose: Pose) {
        self.0 = pose;
    }
}

/// Figure-eight driven by the virtual clock, so the owner always has fresh
/// motion to publish.
fn scripted_pose(t: f32) -> Pose {
    let position = Vec3::new((t * 0.9).sin() * 4.0, 0.0, (t * 1.8).sin() * 2.0);
    Pose::new(position, Quat::from_rotation_y(t * 0.9), Vec3::ONE)
}

const FRAME_MS: u64 = 20;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = SyncConfig {
        interval_mode: IntervalMode::Timed,
        interval_secs: args.interval,
        delivery: if args.unreliable {
            Delivery::Unreliable
        } else {
            Delivery::Reliable
        },
        extrapolation_span: args.extrapolation,
        teleport_threshold: args.teleport_threshold,
        authority: AuthorityRole::OwnerAuthoritative,
        ..SyncConfig::default()
    };

    let mut owner = SyncController::new(Endpoint::Owner, config, TrackedPose(scripted_pose(0.0)));
    owner.set_authority(true);
    let mut source = SyncController::new(Endpoint::Source, config, TrackedPose(scripted_pose(0.0)));
    source.set_authority(true);

    let mut link = LoopbackLink::new(LinkConditions {
        loss_percent: args.loss_percent,
        min_latency_ms: args.min_latency,
        max_latency_ms: args.max_latency,
        jitter_ms: args.jitter,
    });

    let (to_source, mut source_inbox) = packet_queue();
    let (to_owner, mut owner_inbox) = packet_queue();

    let total_frames = (args.duration * 1000.0) as u64 / FRAME_MS;
    let dt = FRAME_MS as f32 / 1000.0;
    let warmup = total_frames / 10;

    let mut error_sum = 0.0f32;
    let mut error_max = 0.0f32;
    let mut samples = 0u32;

    for frame in 0..total_frames {
        let now_ms = frame * FRAME_MS;
        let now = now_ms as f32 / 1000.0;
        link.advance_to(now_ms);

        owner.accessor_mut().0 = scripted_pose(now);
        owner.on_tick(TickContext::frame(now, dt), &mut link);

        link.deliver(&to_owner, &to_source);
        source_inbox.drain(|direction, bytes| source.on_packet_received(direction, bytes));
        owner_inbox.drain(|direction, bytes| owner.on_packet_received(direction, bytes));

        source.on_tick(TickContext::frame(now, dt), &mut link);

        if frame >= warmup {
            let error = source
                .accessor()
                .pose()
                .position
                .distance(owner.accessor().pose().position);
            error_sum += error;
            error_max = error_max.max(error);
            samples += 1;
        }

        if now_ms % 1000 == 0 {
            info!(
                "t={now:.1}s owner={:?} source={:?}",
                owner.accessor().pose().position,
                source.accessor().pose().position
            );
        }
    }

    println!(
        "frames: {total_frames}, packets sent: {}, dropped: {}",
        link.sent, link.dropped
    );
    if samples > 0 {
        println!(
            "position error after warmup: mean {:.3}, max {:.3}",
            error_sum / samples as f32,
            error_max
        );
    }

    Ok(())
}

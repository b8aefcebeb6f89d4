use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use chainsense_node::{
    common::{
        constants::EVENT_QUEUE_SIZE, CommandCode, PeripheralKind, RoleConfig, TransitionEvent,
    },
    Controller, EventQueue, EventStore, HostMbox,
};
use clap::Parser;
use integration_tests::{
    sim_chain::SimChain,
    utils::{RecordingLine, SimHost},
};

#[derive(Parser, Debug)]
struct Args {
    /// Number of simulated nodes on the chain
    #[clap(long, short, default_value = "3")]
    nodes: usize,
    /// Role config TOML file. Defaults to the test peripheral role.
    #[clap(long, short)]
    config: Option<PathBuf>,
    /// Simulated run time in milliseconds
    #[clap(long, short, default_value = "5000")]
    duration_ms: u64,
    /// Interval between random detection changes
    #[clap(long, default_value = "200")]
    toggle_ms: u64,
    /// Interval between host reads of the event stream
    #[clap(long, default_value = "5")]
    host_read_ms: u64,
    /// Poll in real time instead of as fast as possible
    #[clap(long)]
    realtime: bool,
}

fn main() {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match RoleConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(-1);
            }
        },
        None => RoleConfig::for_peripheral(PeripheralKind::Test),
    };
    log::info!(
        "Simulating {} nodes with mask {:#04x} at host address {:#04x}",
        args.nodes,
        config.default_mask,
        config.bus_address
    );

    let queue: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
    let line = RecordingLine::new();
    let mbox = HostMbox::new(&queue, &line);
    let chain = SimChain::new(args.nodes);
    let mut controller = Controller::new(config, &mbox, chain.clone());

    let mut host = SimHost::new(args.host_read_ms);
    let mut streaming = false;
    let mut next_toggle_ms = 0;
    let mut detected = vec![0u8; args.nodes];

    let epoch = Instant::now();
    for now_ms in 0..args.duration_ms {
        controller.process(now_ms);

        if !streaming && controller.engine().is_running() {
            mbox.handle_command(&[CommandCode::GetNodeCount.raw()]).ok();
            log::info!("Host read node count {}", mbox.supply_reply());
            mbox.handle_command(&[CommandCode::EnableActive.raw()]).ok();
            streaming = true;
        }

        if streaming && args.nodes > 0 && now_ms >= next_toggle_ms {
            // Flip one random channel on one random node
            let node = rand::random::<u8>() as usize % args.nodes;
            let channel = rand::random::<u8>() % 8;
            detected[node] ^= 1 << channel;
            chain.set_detected(node, detected[node]);
            next_toggle_ms = now_ms + args.toggle_ms;
        }

        if let Some(event) = host.service(now_ms, &mbox, &line) {
            print_event(now_ms, event);
        }

        if args.realtime {
            let target = epoch + Duration::from_millis(now_ms + 1);
            if let Some(wait) = target.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }
    }

    if controller.engine().is_faulted() {
        log::error!("Discovery failed, check the node count");
    }
    log::info!(
        "Host received {} events, {} still queued, {} dropped",
        host.received().len(),
        queue.len(),
        queue.dropped()
    );
}

fn print_event(now_ms: u64, event: TransitionEvent) {
    let (level, node, channel) = event.into_parts();
    let what = if event.is_detection() {
        "detected"
    } else {
        "cleared"
    };
    println!(
        "{now_ms:>6} ms: node {node:2} channel {channel} {what} ({level}, {:#04x})",
        event.raw()
    );
}

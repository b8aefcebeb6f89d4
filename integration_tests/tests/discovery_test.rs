use integration_tests::prelude::*;

/// Run discovery against `chain`, returning the controller once the engine stops discovering
fn discover<'a>(
    mbox: &'a HostMbox<'a>,
    chain: &SimChain,
    config: RoleConfig,
    now: &mut u64,
) -> Controller<'a, SimChain> {
    let mut controller = Controller::new(config, mbox, chain.clone());
    let done = run_until(&mut controller, now, 10_000, |c| {
        !c.engine_state().is_discovering()
    });
    assert!(done, "discovery never finished");
    controller
}

#[test]
fn test_discovery_converges_for_every_chain_length() {
    let _ = env_logger::try_init();

    for n in 1..=MAX_NODES {
        let queue: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
        let line = RecordingLine::new();
        let mbox = HostMbox::new(&queue, &line);
        let chain = SimChain::new(n);
        let mut now = 0;

        let controller = discover(&mbox, &chain, RoleConfig::default(), &mut now);
        assert_eq!(EngineState::Pace, controller.engine_state(), "n = {n}");
        assert_eq!(n as u8, controller.engine().node_count(), "n = {n}");
        assert_eq!(n as u32 + 1, controller.engine().discovery_cycles(), "n = {n}");
        assert_eq!(n + 1, chain.completed_cycles(), "n = {n}");
        // Nothing is detected, so discovery must not report any transitions
        assert!(queue.is_empty());
    }
}

#[test]
fn test_discovery_faults_on_overlong_chain() {
    let _ = env_logger::try_init();

    for n in [MAX_NODES + 1, MAX_NODES + 4] {
        let queue: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
        let line = RecordingLine::new();
        let mbox = HostMbox::new(&queue, &line);
        let chain = SimChain::new(n);
        let mut now = 0;

        let mut controller = discover(&mbox, &chain, RoleConfig::default(), &mut now);
        assert_eq!(EngineState::Fault, controller.engine_state());
        assert_eq!(17, controller.engine().discovery_cycles());
        assert_eq!(0, controller.engine().node_count());

        // The fault is permanent, and the chain is left alone
        let cycles = chain.completed_cycles();
        run_for(&mut controller, &mut now, 5000);
        assert_eq!(EngineState::Fault, controller.engine_state());
        assert_eq!(cycles, chain.completed_cycles());
    }
}

#[test]
fn test_discovery_respects_lowered_node_limit() {
    let queue: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
    let line = RecordingLine::new();
    let mbox = HostMbox::new(&queue, &line);
    let mut now = 0;

    let config = RoleConfig::default().with_max_nodes(4);
    let chain = SimChain::new(4);
    let controller = discover(&mbox, &chain, config, &mut now);
    assert_eq!(4, controller.engine().node_count());

    let chain = SimChain::new(5);
    let controller = discover(&mbox, &chain, config, &mut now);
    assert_eq!(EngineState::Fault, controller.engine_state());
    assert_eq!(5, controller.engine().discovery_cycles());
}

#[test]
fn test_discovery_faults_on_bare_loopback() {
    let queue: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
    let line = RecordingLine::new();
    let mbox = HostMbox::new(&queue, &line);
    let chain = SimChain::new(0);
    let mut now = 0;

    let controller = discover(&mbox, &chain, RoleConfig::default(), &mut now);
    assert_eq!(EngineState::Fault, controller.engine_state());
    assert_eq!(1, controller.engine().discovery_cycles());
}

#[test]
fn test_discovery_retries_after_bus_error() {
    let _ = env_logger::try_init();

    let queue: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
    let line = RecordingLine::new();
    let mbox = HostMbox::new(&queue, &line);
    let chain = SimChain::new(3);
    chain.fail_transfers(1);
    let mut now = 0;

    let controller = discover(&mbox, &chain, RoleConfig::default(), &mut now);
    assert_eq!(3, controller.engine().node_count());
    // The failed trial is not counted
    assert_eq!(4, controller.engine().discovery_cycles());
    assert!(!chain.is_selected());
}

#[test]
fn test_default_masks_latched_after_discovery() {
    let queue: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
    let line = RecordingLine::new();
    let mbox = HostMbox::new(&queue, &line);
    let chain = SimChain::new(3);
    let mut now = 0;

    let config = RoleConfig::for_peripheral(PeripheralKind::ArduinoUno);
    let mut controller = discover(&mbox, &chain, config, &mut now);
    // Discovery leaves every node with a zero mask
    for node in 0..3 {
        assert_eq!(0x00, chain.node_mask(node));
    }

    let cycles = chain.completed_cycles();
    assert!(run_until(&mut controller, &mut now, 200, |_| {
        chain.completed_cycles() > cycles
    }));
    for node in 0..3 {
        assert_eq!(0x3F, chain.node_mask(node));
        assert_eq!(Some(0x3F), controller.engine().node_mask(node as u8));
    }
}

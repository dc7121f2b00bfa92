//! Bus interface adapter
//!
//! [`HyperBusController`] is the surface the system bus talks to. It holds at
//! most one outstanding transaction, validates requests before they reach the
//! wire, and advances the protocol sequencer one clock cycle per
//! [`tick`](HyperBusController::tick).

use alloc::boxed::Box;
use alloc::vec::Vec;

use heapless::Deque;

use crate::ca::{self, CommandAddress};
use crate::config::{TimingConfig, TimingParams};
use crate::error::{Error, Result};
use crate::fsm::{Sequencer, State};
use crate::phy::HyperBusPhy;
use crate::transaction::{TransactionRequest, TransferResult, TransferStatus};

/// Completed results kept for [`HyperBusController::poll`]
pub const RESULT_SLOTS: usize = 8;

/// Completion callback, invoked once with the transaction's result
pub type CompletionCallback = Box<dyn FnOnce(&TransferResult) + Send>;

/// Identifies one submitted transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionHandle(u32);

impl TransactionHandle {
    /// Sequence number of the transaction
    pub const fn id(&self) -> u32 {
        self.0
    }
}

struct Pending {
    handle: TransactionHandle,
    request: TransactionRequest,
    ca: CommandAddress,
    callback: Option<CompletionCallback>,
}

struct Active {
    handle: TransactionHandle,
    callback: Option<CompletionCallback>,
}

/// Single-outstanding HyperBus controller
pub struct HyperBusController<P: HyperBusPhy> {
    phy: P,
    sequencer: Sequencer,
    pending: Option<Pending>,
    active: Option<Active>,
    completed: Deque<(TransactionHandle, TransferResult), RESULT_SLOTS>,
    next_id: u32,
    total_cycles: u64,
}

impl<P: HyperBusPhy> HyperBusController<P> {
    /// Create a controller around a validated configuration
    pub fn new(config: TimingConfig, phy: P) -> Self {
        Self {
            phy,
            sequencer: Sequencer::new(config),
            pending: None,
            active: None,
            completed: Deque::new(),
            next_id: 0,
            total_cycles: 0,
        }
    }

    /// Validate `params` and create a controller
    pub fn with_params(params: TimingParams, phy: P) -> Result<Self> {
        Ok(Self::new(TimingConfig::new(params)?, phy))
    }

    /// Timing configuration in use
    pub fn config(&self) -> &TimingConfig {
        self.sequencer.config()
    }

    /// Current protocol state
    pub fn state(&self) -> State {
        self.sequencer.state()
    }

    /// Clock cycles ticked since construction
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Returns true while a transaction is pending or on the bus
    pub fn is_busy(&self) -> bool {
        self.pending.is_some() || self.active.is_some()
    }

    /// Borrow the PHY
    pub fn phy(&self) -> &P {
        &self.phy
    }

    /// Mutably borrow the PHY
    pub fn phy_mut(&mut self) -> &mut P {
        &mut self.phy
    }

    /// Consume the controller and return the PHY
    pub fn into_phy(self) -> P {
        self.phy
    }

    /// Queue a transaction
    ///
    /// The request is checked completely here; a rejected request never
    /// reaches the bus and leaves the controller idle.
    pub fn submit(&mut self, request: TransactionRequest) -> Result<TransactionHandle> {
        self.enqueue(request, None)
    }

    /// Queue a transaction whose result goes to `callback` instead of `poll`
    ///
    /// The callback runs inside [`tick`](Self::tick) when the transaction
    /// ends, or inside [`cancel`](Self::cancel) with an aborted result.
    pub fn submit_with_callback<F>(
        &mut self,
        request: TransactionRequest,
        callback: F,
    ) -> Result<TransactionHandle>
    where
        F: FnOnce(&TransferResult) + Send + 'static,
    {
        self.enqueue(request, Some(Box::new(callback)))
    }

    fn enqueue(
        &mut self,
        request: TransactionRequest,
        callback: Option<CompletionCallback>,
    ) -> Result<TransactionHandle> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        request.check_burst()?;
        let ca = ca::encode(&request)?;

        let handle = TransactionHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        log::debug!(
            "hyperbus: submit #{} {:?} 0x{:08X} x{}",
            handle.0,
            request.direction(),
            request.address(),
            request.burst_len()
        );

        self.pending = Some(Pending {
            handle,
            request,
            ca,
            callback,
        });
        Ok(handle)
    }

    /// Advance the bus by one clock cycle
    pub fn tick(&mut self) {
        self.total_cycles += 1;

        if self.active.is_none() {
            if let Some(pending) = self.pending.take() {
                self.sequencer.load(pending.request, pending.ca);
                self.active = Some(Active {
                    handle: pending.handle,
                    callback: pending.callback,
                });
            }
        }

        let Some(result) = self.sequencer.step(&mut self.phy) else {
            return;
        };
        match self.active.take() {
            Some(Active {
                handle,
                callback: Some(callback),
            }) => {
                log::trace!("hyperbus: #{} delivered to callback", handle.0);
                callback(&result);
            }
            Some(Active {
                handle,
                callback: None,
            }) => self.store(handle, result),
            None => log::warn!("hyperbus: result without an active transaction"),
        }
    }

    fn store(&mut self, handle: TransactionHandle, result: TransferResult) {
        if self.completed.is_full() {
            if let Some((dropped, _)) = self.completed.pop_front() {
                log::warn!("hyperbus: result #{} never polled, dropping it", dropped.0);
            }
        }
        // Cannot fail, a slot was freed above
        let _ = self.completed.push_back((handle, result));
    }

    /// Collect the result of `handle`
    ///
    /// Returns `Ok(None)` while the transaction is still pending or on the
    /// bus. A result is handed out once; polling again is `UnknownHandle`.
    pub fn poll(&mut self, handle: TransactionHandle) -> Result<Option<TransferResult>> {
        let mut found = None;
        for _ in 0..self.completed.len() {
            if let Some(entry) = self.completed.pop_front() {
                if found.is_none() && entry.0 == handle {
                    found = Some(entry.1);
                } else {
                    let _ = self.completed.push_back(entry);
                }
            }
        }
        if found.is_some() {
            return Ok(found);
        }

        if self.is_in_flight(handle) {
            Ok(None)
        } else {
            Err(Error::UnknownHandle)
        }
    }

    /// Withdraw a transaction that has not reached the bus yet
    pub fn cancel(&mut self, handle: TransactionHandle) -> Result<()> {
        if self.active.as_ref().is_some_and(|a| a.handle == handle) {
            return Err(Error::NotCancellable);
        }
        match self.pending.take() {
            Some(pending) if pending.handle == handle => {
                log::debug!("hyperbus: cancelled #{}", handle.0);
                if let Some(callback) = pending.callback {
                    callback(&TransferResult {
                        status: TransferStatus::Aborted,
                        data: Vec::new(),
                        fault: None,
                        cycles: 0,
                        refreshes: 0,
                    });
                }
                Ok(())
            }
            other => {
                self.pending = other;
                Err(Error::UnknownHandle)
            }
        }
    }

    /// Tick until `handle` completes and return its result
    ///
    /// Termination is bounded by the latency limits and the watchdog.
    pub fn run_until_complete(&mut self, handle: TransactionHandle) -> Result<TransferResult> {
        loop {
            if let Some(result) = self.poll(handle)? {
                return Ok(result);
            }
            self.tick();
        }
    }

    /// Tick until nothing is pending or on the bus; returns cycles spent
    pub fn run_until_idle(&mut self) -> u64 {
        let start = self.total_cycles;
        while self.is_busy() {
            self.tick();
        }
        self.total_cycles - start
    }

    fn is_in_flight(&self, handle: TransactionHandle) -> bool {
        self.pending.as_ref().is_some_and(|p| p.handle == handle)
            || self.active.as_ref().is_some_and(|a| a.handle == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::RegisterId;
    use crate::phy::WireEvent;
    use crate::serdes::WireBeat;
    use crate::transaction::AddressSpace;
    use alloc::sync::Arc;
    use alloc::vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Records every PHY call; answers reads with a fixed beat pair
    #[derive(Default)]
    struct TestPhy {
        events: Vec<WireEvent>,
        rwds: Option<bool>,
        read_beats: Option<[u16; 2]>,
    }

    impl TestPhy {
        fn driven(&self) -> Vec<u16> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    WireEvent::Drive { beats } => Some([beats[0].data, beats[1].data]),
                    _ => None,
                })
                .flatten()
                .collect()
        }

        /// Longest run of cycles with CS# low
        fn max_cs_low(&self) -> u32 {
            let (mut low, mut run, mut max) = (false, 0, 0);
            for event in &self.events {
                match event {
                    WireEvent::ChipSelect { asserted } => {
                        low = *asserted;
                        run = 0;
                    }
                    WireEvent::RwdsSample { .. } => {}
                    _ if low => {
                        run += 1;
                        max = max.max(run);
                    }
                    _ => {}
                }
            }
            max
        }
    }

    impl HyperBusPhy for TestPhy {
        fn set_cs(&mut self, asserted: bool) {
            self.events.push(WireEvent::ChipSelect { asserted });
        }

        fn idle(&mut self) {
            self.events.push(WireEvent::Idle);
        }

        fn clock(&mut self, drive: Option<[WireBeat; 2]>) -> Option<[u16; 2]> {
            match drive {
                Some(beats) => {
                    self.events.push(WireEvent::Drive { beats });
                    None
                }
                None => {
                    self.events.push(WireEvent::Receive {
                        beats: self.read_beats,
                    });
                    self.read_beats
                }
            }
        }

        fn sample_rwds(&mut self) -> Option<bool> {
            self.events.push(WireEvent::RwdsSample { level: self.rwds });
            self.rwds
        }
    }

    fn scenario_params() -> TimingParams {
        TimingParams::default()
            .with_initial_latency(6)
            .with_fixed_latency(true)
            .with_cs_setup(2)
            .with_cs_hold(2)
            .with_tcsm(256)
    }

    fn controller(params: TimingParams, phy: TestPhy) -> HyperBusController<TestPhy> {
        HyperBusController::with_params(params, phy).unwrap()
    }

    #[test]
    fn test_write_scenario() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        let handle = ctrl
            .submit(TransactionRequest::write(
                AddressSpace::Memory,
                0x10,
                vec![0xAAAA, 0xBBBB],
            ))
            .unwrap();

        let result = ctrl.run_until_complete(handle).unwrap();
        assert!(result.is_completed());
        assert!(result.data.is_empty());
        assert_eq!(result.cycles, 15);
        assert_eq!(result.refreshes, 0);
        assert_eq!(ctrl.state(), State::Idle);

        let phy = ctrl.into_phy();
        assert_eq!(
            phy.driven(),
            vec![0x20, 0x00, 0x00, 0x02, 0x00, 0x00, 0xAA, 0xAA, 0xBB, 0xBB]
        );
        let waits = phy
            .events
            .iter()
            .filter(|e| matches!(e, WireEvent::Receive { beats: None }))
            .count();
        assert_eq!(waits, 6);
        assert_eq!(phy.events[0], WireEvent::ChipSelect { asserted: true });
        assert!(!phy
            .events
            .iter()
            .any(|e| matches!(e, WireEvent::RwdsSample { .. })));
    }

    #[test]
    fn test_state_sequence() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        ctrl.submit(TransactionRequest::write(AddressSpace::Memory, 0, vec![1]))
            .unwrap();
        assert_eq!(ctrl.state(), State::Idle);

        let mut states = Vec::new();
        while ctrl.is_busy() {
            ctrl.tick();
            states.push(ctrl.state());
        }
        let mut expected = vec![State::AssertCs];
        expected.extend([State::CaPhase; 3]);
        expected.extend([State::LatencyWait; 6]);
        expected.extend([State::DataPhase, State::Recovery, State::Recovery, State::Idle]);
        assert_eq!(states, expected);
    }

    #[test]
    fn test_double_submit_is_busy() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        let first = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0, 1))
            .unwrap();
        assert_eq!(
            ctrl.submit(TransactionRequest::read(AddressSpace::Memory, 4, 1)),
            Err(Error::Busy)
        );
        ctrl.tick();
        assert_eq!(
            ctrl.submit(TransactionRequest::read(AddressSpace::Memory, 4, 1)),
            Err(Error::Busy)
        );
        assert_eq!(ctrl.poll(first), Ok(None));
    }

    #[test]
    fn test_rejected_requests_leave_idle() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        assert_eq!(
            ctrl.submit(TransactionRequest::read(AddressSpace::Register, 4, 1)),
            Err(Error::InvalidAddress)
        );
        assert_eq!(
            ctrl.submit(TransactionRequest::read(AddressSpace::Register, 0, 2)),
            Err(Error::InvalidBurst)
        );
        assert_eq!(
            ctrl.submit(TransactionRequest::read(AddressSpace::Memory, 0, 0)),
            Err(Error::InvalidBurst)
        );
        assert_eq!(ctrl.state(), State::Idle);
        assert!(!ctrl.is_busy());

        ctrl.tick();
        assert_eq!(ctrl.state(), State::Idle);
        assert_eq!(ctrl.phy().events, vec![WireEvent::Idle]);

        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Register, 0, 1))
            .unwrap();
        assert_eq!(handle.id(), 0);
    }

    #[test]
    fn test_cancel_only_before_bus() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0, 1))
            .unwrap();
        assert_eq!(ctrl.cancel(handle), Ok(()));
        assert_eq!(ctrl.poll(handle), Err(Error::UnknownHandle));
        assert!(!ctrl.is_busy());

        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0, 1))
            .unwrap();
        ctrl.tick();
        assert_eq!(ctrl.cancel(handle), Err(Error::NotCancellable));
        assert_eq!(ctrl.cancel(TransactionHandle(99)), Err(Error::UnknownHandle));
    }

    #[test]
    fn test_callback_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctrl = controller(scenario_params(), TestPhy::default());

        let seen = calls.clone();
        let handle = ctrl
            .submit_with_callback(
                TransactionRequest::write(AddressSpace::Memory, 0x10, vec![0xAAAA, 0xBBBB]),
                move |result| {
                    assert!(result.is_completed());
                    seen.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        assert_eq!(ctrl.run_until_idle(), 15);
        for _ in 0..10 {
            ctrl.tick();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctrl.poll(handle), Err(Error::UnknownHandle));

        // Cancelled callbacks hear about it too
        let seen = calls.clone();
        let handle = ctrl
            .submit_with_callback(
                TransactionRequest::read(AddressSpace::Memory, 0, 1),
                move |result| {
                    assert_eq!(result.status, TransferStatus::Aborted);
                    seen.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        ctrl.cancel(handle).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_poll_consumes_result() {
        let phy = TestPhy {
            read_beats: Some([0x12, 0x34]),
            ..Default::default()
        };
        let mut ctrl = controller(scenario_params(), phy);
        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0, 3))
            .unwrap();
        ctrl.run_until_idle();

        let result = ctrl.poll(handle).unwrap().unwrap();
        assert_eq!(result.data, vec![0x1234; 3]);
        assert_eq!(ctrl.poll(handle), Err(Error::UnknownHandle));
    }

    #[test]
    fn test_oldest_unpolled_result_dropped() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        let mut handles = Vec::new();
        for i in 0..RESULT_SLOTS + 1 {
            let h = ctrl
                .submit(TransactionRequest::write(
                    AddressSpace::Memory,
                    i as u32,
                    vec![0],
                ))
                .unwrap();
            ctrl.run_until_idle();
            handles.push(h);
        }
        assert_eq!(ctrl.poll(handles[0]), Err(Error::UnknownHandle));
        for h in &handles[1..] {
            assert!(ctrl.poll(*h).unwrap().is_some());
        }
    }

    #[test]
    fn test_variable_latency_doubles() {
        let phy = TestPhy {
            rwds: Some(true),
            read_beats: Some([0xAB, 0xCD]),
            ..Default::default()
        };
        let mut ctrl = controller(scenario_params().with_fixed_latency(false), phy);
        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0x40, 2))
            .unwrap();
        let result = ctrl.run_until_complete(handle).unwrap();

        assert!(result.is_completed());
        assert_eq!(result.data, vec![0xABCD, 0xABCD]);
        // setup + CA + 2 x latency + 2 data + hold
        assert_eq!(result.cycles, 2 + 3 + 12 + 2 + 2);

        let samples: Vec<_> = ctrl
            .phy()
            .events
            .iter()
            .filter(|e| matches!(e, WireEvent::RwdsSample { .. }))
            .collect();
        assert_eq!(samples.len(), 1);
        // Sampled before the second CA cycle is clocked
        assert_eq!(ctrl.phy().events[4], WireEvent::RwdsSample { level: Some(true) });
    }

    #[test]
    fn test_missed_sample_aborts() {
        let mut ctrl = controller(
            scenario_params().with_fixed_latency(false),
            TestPhy::default(),
        );
        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0, 4))
            .unwrap();
        let result = ctrl.run_until_complete(handle).unwrap();

        assert_eq!(result.status, TransferStatus::Aborted);
        assert_eq!(result.fault, Some(Error::LatencySampleFault));
        assert!(result.data.is_empty());
        assert_eq!(ctrl.state(), State::Idle);
        assert_eq!(
            ctrl.phy().events.last(),
            Some(&WireEvent::Idle),
            "recovery ends with CK parked"
        );

        // The controller is usable again
        ctrl.phy_mut().rwds = Some(false);
        let handle = ctrl
            .submit(TransactionRequest::write(AddressSpace::Memory, 0, vec![7]))
            .unwrap();
        assert!(ctrl.run_until_complete(handle).unwrap().is_completed());
    }

    #[test]
    fn test_read_stall_times_out() {
        let params = scenario_params().with_watchdog(5);
        let mut ctrl = controller(params, TestPhy::default());
        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0, 2))
            .unwrap();
        let result = ctrl.run_until_complete(handle).unwrap();

        assert_eq!(result.status, TransferStatus::TimedOut);
        assert_eq!(result.fault, Some(Error::TimedOut));
        // setup + CA + latency + 6 stalled cycles + hold
        assert_eq!(result.cycles, 2 + 3 + 6 + 6 + 2);
    }

    #[test]
    fn test_tcsm_splits_long_burst() {
        let phy = TestPhy {
            read_beats: Some([0x00, 0x55]),
            ..Default::default()
        };
        let mut ctrl = controller(scenario_params().with_tcsm(15), phy);
        let handle = ctrl
            .submit(TransactionRequest::read(AddressSpace::Memory, 0x100, 8))
            .unwrap();
        let result = ctrl.run_until_complete(handle).unwrap();

        assert!(result.is_completed());
        assert_eq!(result.data.len(), 8);
        assert_eq!(result.refreshes, 1);
        assert_eq!(result.cycles, 34);

        let phy = ctrl.phy();
        assert_eq!(phy.max_cs_low(), 15);
        // Second window resumes four words in: 0x104 -> upper 0x20, lower 4
        let ca = phy.driven();
        assert_eq!(&ca[..6], &[0xA0, 0x00, 0x00, 0x20, 0x00, 0x00]);
        assert_eq!(&ca[6..], &[0xA0, 0x00, 0x00, 0x20, 0x00, 0x04]);
    }

    #[test]
    fn test_register_write_skips_latency() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        let handle = ctrl
            .submit(TransactionRequest::write(
                AddressSpace::Register,
                RegisterId::Cr0.index(),
                vec![0x8F1F],
            ))
            .unwrap();
        let result = ctrl.run_until_complete(handle).unwrap();
        assert!(result.is_completed());
        assert_eq!(result.cycles, 2 + 3 + 1 + 2);
        assert_eq!(
            ctrl.phy().driven(),
            vec![0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x8F, 0x1F]
        );
    }

    #[test]
    fn test_boxed_phy() {
        let phy: Box<dyn HyperBusPhy + Send> = Box::new(TestPhy::default());
        let mut ctrl = HyperBusController::with_params(scenario_params(), phy).unwrap();
        let handle = ctrl
            .submit(TransactionRequest::write(AddressSpace::Memory, 0x10, vec![0xAAAA]))
            .unwrap();
        assert!(ctrl.run_until_complete(handle).unwrap().is_completed());
        assert_eq!(ctrl.total_cycles(), 14);
    }

    #[test]
    fn test_total_cycles_counts_idle_ticks() {
        let mut ctrl = controller(scenario_params(), TestPhy::default());
        ctrl.tick();
        ctrl.tick();
        assert_eq!(ctrl.total_cycles(), 2);
        assert_eq!(ctrl.config().initial_latency(), 6);
    }
}

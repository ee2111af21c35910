//! Property-based tests for verifying system invariants.

#[cfg(test)]
mod property_tests {
    use crate::arch::HostArch;
    use crate::kernel::Scheduler;
    use crate::sync::{MutexState, RawMutex};
    use crate::tests::helpers::*;
    use crate::thread::ThreadId;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Simple linear congruential generator for property testing.
    struct SimpleRng {
        state: u64,
    }

    impl SimpleRng {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_u64(&mut self) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.state
        }

        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            min + (self.next_u64() % (max - min))
        }

        fn gen_bool(&mut self) -> bool {
            self.next_u64() & 1 == 0
        }
    }

    const SLOTS: usize = 8;
    const MUTEXES: usize = 2;

    /// What the scheduler should look like, tracked independently of it.
    struct Model {
        owner: [Option<ThreadId>; MUTEXES],
        waiters: [VecDeque<ThreadId>; MUTEXES],
    }

    impl Model {
        fn holds_any(&self, id: ThreadId) -> bool {
            self.owner.contains(&Some(id))
        }

        fn expected_state(&self, mutex: usize) -> MutexState {
            match (self.owner[mutex], self.waiters[mutex].front()) {
                (None, _) => MutexState::Unlocked,
                (Some(_), None) => MutexState::LockedNoWaiters,
                (Some(_), Some(&head)) => MutexState::LockedWithWaiters(head),
            }
        }
    }

    fn sole_runnable(sched: &Scheduler<HostArch, SLOTS>) -> bool {
        run_order(sched).len() == 1
    }

    fn step(
        rng: &mut SimpleRng,
        sched: &'static Scheduler<HostArch, SLOTS>,
        mutexes: &[RawMutex; MUTEXES],
        model: &mut Model,
    ) {
        let current = sched.current_id();
        match rng.gen_range(0, 6) {
            0 => {
                let (before, _, _) = sched.stats();
                let arg = rng.next_u64() as usize;
                let created = sched.create_thread(leaked_stack(64), idle, arg);
                assert_eq!(created.is_ok(), before < SLOTS);
            }
            1 => {
                sched.select_next(fake_sp(current));
            }
            2 | 3 => {
                let which = rng.gen_range(0, MUTEXES as u64) as usize;
                let mutex = &mutexes[which];
                if model.owner[which] == Some(current) {
                    mutex.unlock(sched);
                    model.owner[which] = model.waiters[which].pop_front();
                } else if model.owner[which].is_none() {
                    assert!(mutex.lock(sched, rng.gen_bool()));
                    model.owner[which] = Some(current);
                } else if rng.gen_bool() || sole_runnable(sched) {
                    assert!(!mutex.lock(sched, false));
                } else {
                    assert!(mutex.lock(sched, true));
                    model.waiters[which].push_back(current);
                    // a blocked thread cannot run on
                    sched.select_next(fake_sp(current));
                }
            }
            4 => {
                sched.yield_now();
                if sched.arch().take_pending_switch() {
                    sched.select_next(fake_sp(current));
                }
            }
            _ => {
                if !sole_runnable(sched) && !model.holds_any(current) {
                    sched.retire_current();
                    sched.select_next(fake_sp(current));
                }
            }
        }

        for which in 0..MUTEXES {
            assert_eq!(mutexes[which].state(sched), model.expected_state(which));
        }
        assert_lists_consistent(sched);
    }

    #[test]
    fn property_lists_survive_random_operations() {
        for seed in [0x12345678u64, 0x87654321, 0xDEADBEEF, 42] {
            let mut rng = SimpleRng::new(seed);
            let sched = started::<SLOTS>();
            let mutexes = [RawMutex::new(), RawMutex::new()];
            let mut model = Model {
                owner: [None; MUTEXES],
                waiters: [VecDeque::new(), VecDeque::new()],
            };

            for _ in 0..500 {
                step(&mut rng, sched, &mutexes, &mut model);
            }

            let (total, runnable, blocked) = sched.stats();
            let waiting: usize = model.waiters.iter().map(VecDeque::len).sum();
            assert_eq!(blocked, waiting);
            assert_eq!(total, runnable + blocked);
        }
    }

    #[test]
    fn property_round_robin_is_fair() {
        let mut rng = SimpleRng::new(0xC0FFEE);
        let sched = started::<SLOTS>();
        let count = rng.gen_range(2, SLOTS as u64) as usize;
        for _ in 1..count {
            sched.create_thread(leaked_stack(64), idle, 0).expect("create");
        }

        let rounds = 50;
        let mut runs = [0usize; SLOTS];
        for _ in 0..rounds * count {
            let current = sched.current_id();
            runs[current.index()] += 1;
            sched.select_next(fake_sp(current));
        }

        // every thread gets exactly one turn per round
        let turns: Vec<usize> = runs.iter().copied().filter(|&n| n > 0).collect();
        assert_eq!(turns.len(), count);
        assert!(turns.iter().all(|&n| n == rounds));
    }

    #[test]
    fn property_saved_pointers_come_back_unchanged() {
        let mut rng = SimpleRng::new(0xFACE);
        let sched = started::<SLOTS>();
        for _ in 1..SLOTS {
            sched.create_thread(leaked_stack(64), idle, 0).expect("create");
        }

        let mut saved = [0usize; SLOTS];
        // first lap: everyone but main still resumes from its primed frame
        for _ in 0..SLOTS {
            let current = sched.current_id();
            let sp = (rng.next_u64() as usize) & !7;
            saved[current.index()] = sp;
            sched.select_next(sp);
        }
        for _ in 0..SLOTS {
            let current = sched.current_id();
            let next_sp = sched.select_next(saved[current.index()]);
            assert_eq!(next_sp, saved[sched.current_id().index()]);
        }
    }
}

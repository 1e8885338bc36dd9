//! Scheduler
//!
//! Single-core, cooperative. The next environment is the RUNNABLE one
//! with the best (numerically lowest) priority; ties go to the first one
//! found scanning round-robin from just after the current environment,
//! so the current environment only keeps the CPU when nothing at least
//! as good is waiting.

use log::trace;

use crate::env::{EnvId, EnvStatus};
use crate::kernel::Kernel;

impl Kernel {
    /// Pick and switch to the next environment. `None` leaves the CPU
    /// idle.
    pub fn schedule(&mut self) -> Option<EnvId> {
        let capacity = self.envs.capacity();
        let start = self.current.map_or(0, |index| index + 1);

        let mut best: Option<(u32, usize)> = None;
        for offset in 0..capacity {
            let index = (start + offset) % capacity;
            let Some(env) = self.envs.get(index) else {
                continue;
            };
            if env.status != EnvStatus::Runnable {
                continue;
            }
            if best.map_or(true, |(priority, _)| env.priority < priority) {
                best = Some((env.priority, index));
            }
        }

        match best {
            Some((_, index)) => {
                self.switch_to(index);
                self.current()
            }
            None => {
                trace!("no runnable environments");
                self.current = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::KernelConfig;
    use crate::drivers::LoopbackPlatform;
    use crate::env::EnvStatus;
    use crate::kernel::Kernel;

    fn kernel() -> Kernel {
        let config = KernelConfig {
            max_envs: 8,
            max_pages: 64,
            ..KernelConfig::default()
        };
        Kernel::new(config, LoopbackPlatform::new()).unwrap()
    }

    #[test]
    fn test_round_robin_among_equals() {
        let mut k = kernel();
        let a = k.env_create().unwrap();
        let b = k.env_create().unwrap();
        let c = k.env_create().unwrap();

        k.env_run(a).unwrap();
        assert_eq!(k.schedule(), Some(b));
        assert_eq!(k.schedule(), Some(c));
        assert_eq!(k.schedule(), Some(a));
    }

    #[test]
    fn test_priority_wins() {
        let mut k = kernel();
        let a = k.env_create().unwrap();
        let b = k.env_create().unwrap();
        let c = k.env_create().unwrap();
        k.envs.get_mut(c.index()).unwrap().priority = 1;

        k.env_run(a).unwrap();
        assert_eq!(k.schedule(), Some(c));
        assert_eq!(k.schedule(), Some(c));

        k.envs.get_mut(c.index()).unwrap().status = EnvStatus::NotRunnable;
        assert_eq!(k.schedule(), Some(a));
        assert_eq!(k.schedule(), Some(b));
    }

    #[test]
    fn test_keeps_sole_runnable_and_idles() {
        let mut k = kernel();
        let a = k.env_create().unwrap();
        k.env_run(a).unwrap();
        assert_eq!(k.schedule(), Some(a));

        k.envs.get_mut(a.index()).unwrap().status = EnvStatus::NotRunnable;
        assert_eq!(k.schedule(), None);
        assert_eq!(k.current(), None);
    }
}

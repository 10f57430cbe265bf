//! The cleanup group: collective ownership of every native slot created
//! against an environment.
//!
//! Slots register themselves on creation. At facade teardown a single
//! [`close_members`](CleanupGroup::close_members) call cancels pending
//! callbacks and waits for in-flight ones on every surviving slot, so a
//! dropped handle can never outlive its pool.

use std::sync::{Arc, Mutex, Weak};

use super::pool::Environment;
use super::{safe_call, NativeObject};

pub(crate) struct CleanupGroup {
    members: Mutex<Vec<Weak<dyn NativeObject>>>,
}

impl CleanupGroup {
    /// Creates a cleanup group and binds it to `environment`: every slot
    /// subsequently created against that environment is adopted here.
    pub(crate) fn new(environment: &Arc<Environment>) -> Arc<Self> {
        let group = Arc::new(Self {
            members: Mutex::new(Vec::new()),
        });
        environment.set_cleanup_group(&group);
        group
    }

    pub(crate) fn register(&self, object: Weak<dyn NativeObject>) {
        let mut members = self
            .members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Opportunistically shed members that were already torn down.
        members.retain(|member| member.strong_count() > 0);
        members.push(object);
    }

    /// Closes every member still alive. Cancels their pending callbacks and
    /// waits for in-flight ones before returning.
    pub(crate) fn close_members(&self) {
        let members = std::mem::take(
            &mut *self
                .members
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        for member in members {
            if let Some(object) = member.upgrade() {
                // Teardown path: a fault here must not unwind further.
                let _ = safe_call("CleanupGroup::close_members", || object.close());
            }
        }
    }
}

impl Drop for CleanupGroup {
    fn drop(&mut self) {
        self.close_members();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::pool::{system_pool, Environment};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        closed: AtomicUsize,
    }

    impl NativeObject for Probe {
        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn close_members_reaches_live_objects() {
        let env = Environment::new(system_pool());
        let group = CleanupGroup::new(&env);

        let probe = Arc::new(Probe {
            closed: AtomicUsize::new(0),
        });
        env.adopt(Arc::downgrade(&probe) as Weak<dyn NativeObject>);

        group.close_members();
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dead_members_are_skipped() {
        let env = Environment::new(system_pool());
        let group = CleanupGroup::new(&env);

        {
            let probe = Arc::new(Probe {
                closed: AtomicUsize::new(0),
            });
            env.adopt(Arc::downgrade(&probe) as Weak<dyn NativeObject>);
        }

        // The probe is gone; closing must simply skip it.
        group.close_members();
    }
}

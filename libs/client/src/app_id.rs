//! Application-id bookkeeping per node.

use std::collections::{HashMap, HashSet};

use crate::error::{BuildError, BuildResult};

/// Hands out application ids, unique per node name. Claiming an id that is
/// already taken is a local usage error (duplicate application id).
#[derive(Debug, Default)]
pub struct AppIdPool {
    taken: HashMap<String, HashSet<u16>>,
}

impl AppIdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a specific id, or the lowest free one when `None`.
    pub fn claim(&mut self, node: &str, app_id: Option<u16>) -> BuildResult<u16> {
        let taken = self.taken.entry(node.to_string()).or_default();
        match app_id {
            Some(id) => {
                if !taken.insert(id) {
                    return Err(BuildError::AppIdInUse(id));
                }
                Ok(id)
            }
            None => {
                let id = (0..=u16::MAX)
                    .find(|candidate| !taken.contains(candidate))
                    .ok_or(BuildError::AppIdInUse(u16::MAX))?;
                taken.insert(id);
                Ok(id)
            }
        }
    }

    /// Return an id to the pool; releasing an unclaimed id is a no-op.
    pub fn release(&mut self, node: &str, app_id: u16) {
        if let Some(taken) = self.taken.get_mut(node) {
            taken.remove(&app_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_are_unique_per_node() {
        let mut pool = AppIdPool::new();
        assert_eq!(pool.claim("alice", None).unwrap(), 0);
        assert_eq!(pool.claim("alice", None).unwrap(), 1);
        assert_eq!(pool.claim("bob", None).unwrap(), 0);

        assert!(matches!(
            pool.claim("alice", Some(1)),
            Err(BuildError::AppIdInUse(1))
        ));

        pool.release("alice", 1);
        assert_eq!(pool.claim("alice", Some(1)).unwrap(), 1);
    }
}

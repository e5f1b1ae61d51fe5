// ABOUTME: Monotonic host port allocation
// ABOUTME: Ports are never handed out twice within one process

use crate::error::{LifecycleError, Result};

#[derive(Debug, Clone)]
pub struct PortAllocator {
    base: u16,
    next: u32,
}

impl PortAllocator {
    pub fn new(base: u16) -> Self {
        Self {
            base,
            next: u32::from(base),
        }
    }

    pub fn allocate(&mut self) -> Result<u16> {
        let port = u16::try_from(self.next).map_err(|_| LifecycleError::PortsExhausted(self.base))?;
        self.next += 1;
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports_increase_and_never_repeat() {
        let mut ports = PortAllocator::new(7100);
        let allocated: Vec<u16> = (0..5).map(|_| ports.allocate().unwrap()).collect();
        assert_eq!(allocated, vec![7100, 7101, 7102, 7103, 7104]);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut ports = PortAllocator::new(u16::MAX);
        assert_eq!(ports.allocate().unwrap(), u16::MAX);
        assert!(matches!(ports.allocate(), Err(LifecycleError::PortsExhausted(_))));
        assert!(ports.allocate().is_err());
    }
}

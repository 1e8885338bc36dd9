//! Physical Page Pool
//!
//! Manages physical memory pages (frames) as a bounded, reference-counted
//! arena.
//!
//! # Design
//! - Each slot holds one 4 KiB frame or nothing
//! - A frame's reference count is the number of page-table entries that
//!   map it, plus any kernel-held references
//! - A frame returns to the pool when its last reference drops
//!
//! # Security Properties
//! - All allocated frames are zeroed before returning
//! - Double-free is detected and causes a panic
//! - Mapping the same frame twice shares it; contents are never duplicated

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use super::address::{PhysAddr, PAGE_SIZE};

/// One physical frame.
struct Frame {
    data: Box<[u8]>,
    refs: u32,
}

/// Bounded arena of physical frames.
pub struct PagePool {
    frames: Vec<Option<Frame>>,
    capacity: usize,
    free_count: usize,
}

impl PagePool {
    /// Create a pool able to hand out `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Vec::new(),
            capacity,
            free_count: capacity,
        }
    }

    /// Allocate a single zeroed frame with a reference count of zero.
    ///
    /// Returns `None` if no frames are available. The caller either maps
    /// the frame (which takes a reference) or hands it back with [`free`].
    ///
    /// [`free`]: PagePool::free
    pub fn alloc(&mut self) -> Option<PhysAddr> {
        if self.free_count == 0 {
            return None;
        }

        let frame = Frame {
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            refs: 0,
        };

        let index = match self.frames.iter().position(Option::is_none) {
            Some(index) => {
                self.frames[index] = Some(frame);
                index
            }
            None => {
                self.frames.push(Some(frame));
                self.frames.len() - 1
            }
        };
        self.free_count -= 1;

        Some(PhysAddr::from_frame_number(index))
    }

    /// Return an unreferenced frame to the pool.
    ///
    /// # Panics
    /// Panics if the frame is not allocated or is still referenced.
    pub fn free(&mut self, addr: PhysAddr) {
        let index = addr.frame_number();
        match self.frames.get(index) {
            Some(Some(frame)) if frame.refs == 0 => {}
            Some(Some(frame)) => {
                panic!("Freeing referenced frame {:?} (refs={})", addr, frame.refs)
            }
            _ => panic!("Double free detected for frame: {:?}", addr),
        }
        self.frames[index] = None;
        self.free_count += 1;
    }

    /// Take a reference on an allocated frame.
    pub fn incref(&mut self, addr: PhysAddr) {
        self.frame_mut(addr).refs += 1;
    }

    /// Drop a reference, freeing the frame when none remain.
    pub fn decref(&mut self, addr: PhysAddr) {
        let frame = self.frame_mut(addr);
        frame.refs -= 1;
        if frame.refs == 0 {
            self.free(addr);
        }
    }

    /// Current reference count, or `None` if the frame is not allocated.
    pub fn refcount(&self, addr: PhysAddr) -> Option<u32> {
        self.frame(addr).map(|frame| frame.refs)
    }

    /// Whether the frame is currently allocated.
    pub fn is_allocated(&self, addr: PhysAddr) -> bool {
        self.frame(addr).is_some()
    }

    /// Bytes backing an allocated frame.
    ///
    /// # Panics
    /// Panics if the frame is not allocated.
    pub fn bytes(&self, addr: PhysAddr) -> &[u8] {
        match self.frame(addr) {
            Some(frame) => &frame.data,
            None => panic!("Access to unallocated frame: {:?}", addr),
        }
    }

    /// Mutable bytes backing an allocated frame.
    pub fn bytes_mut(&mut self, addr: PhysAddr) -> &mut [u8] {
        &mut self.frame_mut(addr).data
    }

    /// Number of frames still available.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of frames currently handed out.
    pub fn allocated_count(&self) -> usize {
        self.capacity - self.free_count
    }

    fn frame(&self, addr: PhysAddr) -> Option<&Frame> {
        self.frames.get(addr.frame_number()).and_then(Option::as_ref)
    }

    fn frame_mut(&mut self, addr: PhysAddr) -> &mut Frame {
        match self.frames.get_mut(addr.frame_number()) {
            Some(Some(frame)) => frame,
            _ => panic!("Access to unallocated frame: {:?}", addr),
        }
    }
}

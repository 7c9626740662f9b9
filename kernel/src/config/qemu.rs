//! QEMU `virt` machine.

/// Physical address of the virtio-mmio slot hosting the block device.
pub const VIRTIO_BLK_PADDR: u32 = 0x1000_1000;

/// Number of descriptors of every virtqueue.
pub const VIRTQ_ENTRY_NUM: usize = 16;

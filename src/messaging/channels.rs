// Lock-free click queue between a sink and its audio renderer

use crate::output::renderer::ScheduledClick;
use ringbuf::{HeapRb, traits::Split};

pub type ClickProducer = ringbuf::HeapProd<ScheduledClick>;
pub type ClickConsumer = ringbuf::HeapCons<ScheduledClick>;

// 64 slots cover well over one second of sixteenth-note ticks at 500 BPM
// while the look-ahead window only ever queues ~100 ms ahead.
pub const CLICK_QUEUE_CAPACITY: usize = 64;

pub fn create_click_channel(capacity: usize) -> (ClickProducer, ClickConsumer) {
    let rb = HeapRb::<ScheduledClick>::new(capacity);
    rb.split()
}

// src/transform/feed.rs

use ringbuf::traits::Producer as RbProducer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Push all of `data`, parking while the ring is full. Gives up early (and
/// returns `false`) once `alive` is cleared.
pub fn push_blocking<P: RbProducer<Item = f32>>(producer: &mut P, data: &[f32], alive: &AtomicBool) -> bool {
    let mut idx = 0usize;
    while idx < data.len() {
        if !alive.load(Ordering::Relaxed) {
            return false;
        }
        let n = producer.push_slice(&data[idx..]);
        if n == 0 {
            std::thread::park_timeout(Duration::from_micros(200));
        }
        idx += n;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Consumer, Split};
    use ringbuf::HeapRb;
    use std::sync::Arc;

    #[test]
    fn pushes_everything_when_drained() {
        let (mut prod, mut cons) = HeapRb::<f32>::new(8).split();
        let alive = Arc::new(AtomicBool::new(true));
        let data: Vec<f32> = (0..64).map(|i| i as f32).collect();

        let reader = std::thread::spawn(move || {
            let mut got = Vec::new();
            while got.len() < 64 {
                match cons.try_pop() {
                    Some(s) => got.push(s),
                    None => std::thread::yield_now(),
                }
            }
            got
        });
        assert!(push_blocking(&mut prod, &data, &alive));
        assert_eq!(reader.join().unwrap(), data);
    }

    #[test]
    fn gives_up_when_stopped() {
        let (mut prod, _cons) = HeapRb::<f32>::new(4).split();
        let alive = AtomicBool::new(false);
        assert!(!push_blocking(&mut prod, &[0.0; 16], &alive));
    }
}

use crate::types::Timestamp;
use std::mem::MaybeUninit;

/// Current realtime from the coarse clock. Monitor entries are produced on
/// every decision, so the cheap low-resolution clock is the right one.
pub fn coarse_realtime() -> Timestamp {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();

    // Cannot fail for a valid clock id and pointer.
    let ts = unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME_COARSE, ts.as_mut_ptr());
        ts.assume_init()
    };

    Timestamp {
        secs: ts.tv_sec as i64,
        nanos: ts.tv_nsec as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coarse_realtime_is_sane() {
        let ts = coarse_realtime();

        // Past 2020-01-01, below year 3000.
        assert!(ts.secs > 1_577_836_800);
        assert!(ts.secs < 32_503_680_000);
        assert!(ts.nanos >= 0 && ts.nanos < 1_000_000_000);
    }
}

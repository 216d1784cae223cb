const MIB: u64 = 1024 * 1024;

/// Rows per batch for a file of `file_size` bytes, clamped to `[min, max]`.
///
/// Depends on the size alone so the same file is always split the same way.
pub fn batch_size_for(file_size: u64, min: usize, max: usize) -> usize {
    let base = if file_size < MIB {
        50
    } else if file_size < 10 * MIB {
        100
    } else if file_size < 100 * MIB {
        200
    } else {
        500
    };
    let min = min.max(1);
    base.clamp(min, max.max(min))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_steps() {
        assert_eq!(batch_size_for(0, 1, 1000), 50);
        assert_eq!(batch_size_for(MIB - 1, 1, 1000), 50);
        assert_eq!(batch_size_for(MIB, 1, 1000), 100);
        assert_eq!(batch_size_for(10 * MIB, 1, 1000), 200);
        assert_eq!(batch_size_for(100 * MIB, 1, 1000), 500);
    }

    #[test]
    fn bounds_win_over_steps() {
        assert_eq!(batch_size_for(0, 80, 500), 80);
        assert_eq!(batch_size_for(200 * MIB, 50, 300), 300);
        assert_eq!(batch_size_for(0, 0, 0), 1);
    }
}

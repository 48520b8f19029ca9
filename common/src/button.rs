/// Detects a button held down for at least `hold_ms`.
///
/// Fed with polled samples; fires once per press, and the button must be
/// released before it can fire again.
#[derive(Debug, Clone)]
pub struct LongPress {
    hold_ms: u64,
    pressed_since: Option<u64>,
    fired: bool,
}

impl LongPress {
    pub fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms,
            pressed_since: None,
            fired: false,
        }
    }

    pub fn update(&mut self, pressed: bool, now_ms: u64) -> bool {
        if !pressed {
            self.pressed_since = None;
            self.fired = false;
            return false;
        }

        let since = *self.pressed_since.get_or_insert(now_ms);
        if !self.fired && now_ms.saturating_sub(since) >= self.hold_ms {
            self.fired = true;
            return true;
        }
        false
    }

    pub fn held_ms(&self, now_ms: u64) -> u64 {
        self.pressed_since
            .map_or(0, |since| now_ms.saturating_sub(since))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_press_does_not_fire() {
        let mut button = LongPress::new(3_000);

        assert!(!button.update(true, 0));
        assert!(!button.update(true, 2_999));
        assert!(!button.update(false, 3_100));
        assert!(!button.update(true, 3_200));
        assert_eq!(button.held_ms(3_300), 100);
    }

    #[test]
    fn long_press_fires_once_until_release() {
        let mut button = LongPress::new(3_000);

        assert!(!button.update(true, 1_000));
        assert!(button.update(true, 4_000));
        assert!(!button.update(true, 9_000));

        assert!(!button.update(false, 9_100));
        assert_eq!(button.held_ms(9_100), 0);
        assert!(!button.update(true, 10_000));
        assert!(button.update(true, 13_000));
    }
}

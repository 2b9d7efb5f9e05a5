//! CGB double-speed detection.
//!
//! A speed switch is `LDH ($4D),A` followed by `STOP`, encoded `E0 4D 10`.
//! The snooper only reports addresses, so the controller feeds the opcode
//! bytes the cartridge answered with. The bus-snoop program depends on the
//! CPU clock, so each detected switch reloads it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusSpeed {
    #[default]
    Normal,
    Double,
}

impl BusSpeed {
    pub fn toggled(self) -> Self {
        match self {
            BusSpeed::Normal => BusSpeed::Double,
            BusSpeed::Double => BusSpeed::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedAction {
    None,
    Switch(BusSpeed),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Idle,
    SawLdh,
    SawKey1,
}

#[derive(Debug, Default)]
pub struct SpeedSwitchDetector {
    state: State,
    speed: BusSpeed,
}

impl SpeedSwitchDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speed(&self) -> BusSpeed {
        self.speed
    }

    pub fn advance(&mut self, byte: u8) -> SpeedAction {
        self.state = match (self.state, byte) {
            (State::Idle, 0xE0) => State::SawLdh,
            (State::SawLdh, 0x4D) => State::SawKey1,
            (State::SawKey1, 0x10) => {
                self.state = State::Idle;
                self.speed = self.speed.toggled();
                return SpeedAction::Switch(self.speed);
            }
            _ => State::Idle,
        };
        SpeedAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switches(bytes: &[u8]) -> usize {
        let mut detector = SpeedSwitchDetector::new();
        bytes
            .iter()
            .filter(|&&b| detector.advance(b) != SpeedAction::None)
            .count()
    }

    #[test]
    fn exact_sequence_switches_once() {
        assert_eq!(switches(&[0x00, 0xE0, 0x4D, 0x10, 0x00]), 1);
    }

    #[test]
    fn any_substitution_prevents_switch() {
        let sequence = [0xE0, 0x4D, 0x10];
        for i in 0..sequence.len() {
            let mut bytes = sequence;
            bytes[i] ^= 0x01;
            assert_eq!(switches(&bytes), 0, "substituted byte {i}");
        }
    }

    #[test]
    fn mismatch_resets_to_idle() {
        assert_eq!(switches(&[0xE0, 0xE0, 0x4D, 0x10]), 0);
    }

    #[test]
    fn each_switch_toggles_speed() {
        let mut detector = SpeedSwitchDetector::new();
        let mut actions = Vec::new();
        for byte in [0xE0, 0x4D, 0x10, 0xE0, 0x4D, 0x10] {
            actions.push(detector.advance(byte));
        }
        assert_eq!(actions[2], SpeedAction::Switch(BusSpeed::Double));
        assert_eq!(actions[5], SpeedAction::Switch(BusSpeed::Normal));
    }
}

//! MBC3 real-time clock.
//!
//! The clock keeps a live register file and a latched copy. Game reads are
//! served by DMA from the latched copy published into the pipeline arena, so
//! the controller republishes it after every latch. Time advances from a
//! microsecond timer in whole milliseconds; a coarse Unix timestamp is kept
//! alongside so the clock can catch up with wall time after a power cycle.

use log::trace;

use crate::error::{Error, Result};

/// Write masks for seconds, minutes, hours, day-low and day-high/control.
pub const REGISTER_MASKS: [u8; 5] = [0x3F, 0x3F, 0x1F, 0xFF, 0xC1];

const CONTROL_DAY_HIGH: u8 = 0x01;
const CONTROL_HALT: u8 = 0x40;
const CONTROL_CARRY: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcRegister {
    Seconds,
    Minutes,
    Hours,
    DayLow,
    /// Bit 0 day high, bit 6 halt, bit 7 day carry.
    DayHigh,
}

impl RtcRegister {
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(RtcRegister::Seconds),
            1 => Some(RtcRegister::Minutes),
            2 => Some(RtcRegister::Hours),
            3 => Some(RtcRegister::DayLow),
            4 => Some(RtcRegister::DayHigh),
            _ => None,
        }
    }

    /// Decodes an MBC3 RAM bank selector value (0x08-0x0C).
    pub const fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0x08..=0x0C => Self::from_index(selector - 0x08),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn mask(self) -> u8 {
        REGISTER_MASKS[self as usize]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcRegisters(pub [u8; 5]);

impl RtcRegisters {
    pub fn get(&self, reg: RtcRegister) -> u8 {
        self.0[reg.index()]
    }

    pub fn seconds(&self) -> u8 {
        self.0[0]
    }

    pub fn minutes(&self) -> u8 {
        self.0[1]
    }

    pub fn hours(&self) -> u8 {
        self.0[2]
    }

    /// 9-bit day counter.
    pub fn days(&self) -> u16 {
        ((self.0[4] & CONTROL_DAY_HIGH) as u16) << 8 | self.0[3] as u16
    }

    pub fn halted(&self) -> bool {
        self.0[4] & CONTROL_HALT != 0
    }

    pub fn carry(&self) -> bool {
        self.0[4] & CONTROL_CARRY != 0
    }

    fn set_days(&mut self, days: u16) {
        self.0[3] = days as u8;
        self.0[4] = (self.0[4] & !CONTROL_DAY_HIGH) | ((days >> 8) as u8 & CONTROL_DAY_HIGH);
    }

    /// Advances by one second. Out-of-range values count up to their mask and
    /// wrap to zero without carrying, as the MBC3 counters do.
    fn tick(&mut self) {
        let seconds = self.0[0];
        if seconds == 59 {
            self.0[0] = 0;
            self.minute_tick();
        } else {
            self.0[0] = seconds.wrapping_add(1) & REGISTER_MASKS[0];
        }
    }

    fn minute_tick(&mut self) {
        let minutes = self.0[1];
        if minutes == 59 {
            self.0[1] = 0;
            self.hour_tick();
        } else {
            self.0[1] = minutes.wrapping_add(1) & REGISTER_MASKS[1];
        }
    }

    fn hour_tick(&mut self) {
        let hours = self.0[2];
        if hours == 23 {
            self.0[2] = 0;
            self.day_tick();
        } else {
            self.0[2] = hours.wrapping_add(1) & REGISTER_MASKS[2];
        }
    }

    fn day_tick(&mut self) {
        let days = self.days();
        if days >= 0x01FF {
            self.set_days(0);
            self.0[4] |= CONTROL_CARRY;
        } else {
            self.set_days(days + 1);
        }
    }

    fn seconds_until_minute_tick(&self) -> u64 {
        let sec = self.0[0] as u64;
        if sec <= 59 { 60 - sec } else { (63 - sec + 1) + 60 }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            let until_minute_tick = self.seconds_until_minute_tick();
            if seconds < until_minute_tick {
                for _ in 0..seconds {
                    self.tick();
                }
                return;
            }

            seconds -= until_minute_tick;
            self.0[0] = 0;
            self.minute_tick();
        }
    }
}

#[derive(Debug, Clone)]
pub struct GbRtc {
    real: RtcRegisters,
    latched: RtcRegisters,
    current: RtcRegister,
    /// Timer value the current millisecond started at.
    last_milli_us: u64,
    /// Milliseconds into the current second.
    millis: u32,
    /// Seconds since the Unix epoch, advanced independently of halt.
    timestamp: u64,
    last_timestamp_tick_us: u64,
}

impl GbRtc {
    pub fn new(now_us: u64) -> Self {
        Self {
            real: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            current: RtcRegister::Seconds,
            last_milli_us: now_us,
            millis: 0,
            timestamp: 0,
            last_timestamp_tick_us: now_us,
        }
    }

    pub fn from_snapshot(snapshot: &RtcSnapshot, now_us: u64) -> Self {
        let mut rtc = Self::new(now_us);
        rtc.real = snapshot.real;
        rtc.latched = snapshot.latched;
        rtc.timestamp = snapshot.timestamp;
        rtc
    }

    pub fn snapshot(&self) -> RtcSnapshot {
        RtcSnapshot {
            real: self.real,
            latched: self.latched,
            timestamp: self.timestamp,
        }
    }

    pub fn real(&self) -> &RtcRegisters {
        &self.real
    }

    pub fn latched(&self) -> &RtcRegisters {
        &self.latched
    }

    pub fn current_register(&self) -> RtcRegister {
        self.current
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Called from the polling loop with the current timer value.
    pub fn perform_tick(&mut self, now_us: u64) {
        if !self.real.halted() {
            let whole_ms = now_us.saturating_sub(self.last_milli_us) / 1000;
            self.last_milli_us += whole_ms * 1000;
            let total = self.millis as u64 + whole_ms;
            self.millis = (total % 1000) as u32;
            let seconds = total / 1000;
            if seconds > 0 {
                self.real.advance_seconds(seconds);
            }
        }

        let elapsed_s = now_us.saturating_sub(self.last_timestamp_tick_us) / 1_000_000;
        if elapsed_s > 0 {
            self.timestamp += elapsed_s;
            self.last_timestamp_tick_us += elapsed_s * 1_000_000;
        }
    }

    /// Stores `val` into the selected register.
    pub fn write_register(&mut self, val: u8, now_us: u64) {
        let was_halted = self.real.halted();
        let reg = self.current;
        self.real.0[reg.index()] = val & reg.mask();

        if reg == RtcRegister::Seconds {
            self.last_milli_us = now_us;
            self.millis = 0;
        }
        if was_halted && !self.real.halted() {
            self.last_milli_us = now_us;
        }
        trace!("RTC write {reg:?} = {:#04x}", self.real.0[reg.index()]);
    }

    /// Selects register `reg` (0..=4); other values are ignored.
    pub fn activate_register(&mut self, reg: u8) {
        if let Some(reg) = RtcRegister::from_index(reg) {
            self.current = reg;
        }
    }

    pub fn latch(&mut self) {
        self.latched = self.real;
    }

    /// Catches the clock up to wall time `timestamp` after a power cycle.
    pub fn advance_to_new_timestamp(&mut self, timestamp: u64) {
        if timestamp > self.timestamp && !self.real.halted() {
            self.real.advance_seconds(timestamp - self.timestamp);
        }
        self.timestamp = timestamp;
        self.millis = 0;
    }

    /// Sets the wall-time reference of a clock that has never run.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}

const SNAPSHOT_MAGIC: &[u8; 4] = b"RTC1";
const SNAPSHOT_VERSION: u8 = 1;
pub const SNAPSHOT_LEN: usize = 4 + 1 + 5 + 5 + 8;

/// Persisted clock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcSnapshot {
    pub real: RtcRegisters,
    pub latched: RtcRegisters,
    pub timestamp: u64,
}

impl RtcSnapshot {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(SNAPSHOT_LEN);
        data.extend_from_slice(SNAPSHOT_MAGIC);
        data.push(SNAPSHOT_VERSION);
        data.extend_from_slice(&self.real.0);
        data.extend_from_slice(&self.latched.0);
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SNAPSHOT_LEN
            || &data[0..4] != SNAPSHOT_MAGIC
            || data[4] != SNAPSHOT_VERSION
        {
            return Err(Error::InvalidRtcSnapshot);
        }

        let mut real = [0u8; 5];
        real.copy_from_slice(&data[5..10]);
        let mut latched = [0u8; 5];
        latched.copy_from_slice(&data[10..15]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&data[15..23]);

        Ok(Self {
            real: RtcRegisters(real),
            latched: RtcRegisters(latched),
            timestamp: u64::from_le_bytes(timestamp),
        })
    }
}

const SECS_PER_MIN: u64 = 60;
const SECS_PER_HOUR: u64 = 3600;
const SECS_PER_DAY: u64 = SECS_PER_HOUR * 24;
const MONTH_DAYS: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Broken-down calendar time. `year` counts from 1970; `month` and `day`
/// start at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimePoint {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub day: u8,
    pub month: u8,
    pub year: u8,
}

fn is_leap_year(offset: u32) -> bool {
    let year = 1970 + offset;
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn month_length(month: u8, year: u32) -> u64 {
    if month == 1 && is_leap_year(year) {
        29
    } else {
        MONTH_DAYS[month as usize] as u64
    }
}

impl TimePoint {
    pub fn from_timestamp(timestamp: u64) -> Self {
        let mut time = timestamp;
        let second = (time % 60) as u8;
        time /= 60;
        let minute = (time % 60) as u8;
        time /= 60;
        let hour = (time % 24) as u8;
        time /= 24;

        let mut year = 0u32;
        loop {
            let len = if is_leap_year(year) { 366 } else { 365 };
            if time < len {
                break;
            }
            time -= len;
            year += 1;
        }

        let mut month = 0u8;
        while month < 11 && time >= month_length(month, year) {
            time -= month_length(month, year);
            month += 1;
        }

        Self {
            second,
            minute,
            hour,
            day: time as u8,
            month,
            year: year as u8,
        }
    }

    pub fn to_timestamp(&self) -> u64 {
        let year = self.year as u32;
        let mut seconds = year as u64 * 365 * SECS_PER_DAY;
        seconds += (0..year).filter(|&y| is_leap_year(y)).count() as u64 * SECS_PER_DAY;
        for month in 0..self.month.min(12) {
            seconds += month_length(month, year) * SECS_PER_DAY;
        }
        seconds += self.day as u64 * SECS_PER_DAY;
        seconds += self.hour as u64 * SECS_PER_HOUR;
        seconds += self.minute as u64 * SECS_PER_MIN;
        seconds + self.second as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs(values: [u8; 5]) -> RtcRegisters {
        RtcRegisters(values)
    }

    #[test]
    fn selectors_map_to_registers() {
        assert_eq!(RtcRegister::from_selector(0x08), Some(RtcRegister::Seconds));
        assert_eq!(RtcRegister::from_selector(0x0C), Some(RtcRegister::DayHigh));
        assert_eq!(RtcRegister::from_selector(0x07), None);
        assert_eq!(RtcRegister::from_selector(0x0D), None);
    }

    #[test]
    fn rtc_ticks_through_invalid_values() {
        let mut r = regs([59, 60, 0, 0, 0]);
        r.advance_seconds(1);
        assert_eq!(r.seconds(), 0);
        assert_eq!(r.minutes(), 61);

        let mut r = regs([63, 5, 0, 0, 0]);
        r.advance_seconds(1);
        assert_eq!(r.seconds(), 0);
        assert_eq!(r.minutes(), 5);

        let mut r = regs([59, 59, 24, 0, 0]);
        r.advance_seconds(1);
        assert_eq!((r.seconds(), r.minutes(), r.hours()), (0, 0, 25));
    }

    #[test]
    fn rtc_day_overflow_sets_carry() {
        let mut r = regs([59, 59, 23, 0xFF, 0x01]);
        r.advance_seconds(1);
        assert_eq!(r.days(), 0);
        assert!(r.carry());
    }

    #[test]
    fn day_low_rolls_into_day_high() {
        let mut r = regs([59, 59, 23, 0xFF, 0x00]);
        r.advance_seconds(1);
        assert_eq!(r.days(), 0x100);
        assert!(!r.carry());
    }

    #[test]
    fn bulk_advance_matches_single_ticks() {
        let mut bulk = regs([17, 42, 22, 0xFE, 0x01]);
        let mut single = bulk;
        bulk.advance_seconds(200_000);
        for _ in 0..200_000 {
            single.tick();
        }
        assert_eq!(bulk, single);
    }

    #[test]
    fn write_register_applies_mask() {
        let mut rtc = GbRtc::new(0);
        for (index, mask) in REGISTER_MASKS.iter().enumerate() {
            rtc.activate_register(index as u8);
            rtc.write_register(0xFF, 0);
            assert_eq!(rtc.real().0[index], *mask);
        }
    }

    #[test]
    fn activate_register_ignores_out_of_range() {
        let mut rtc = GbRtc::new(0);
        rtc.activate_register(2);
        rtc.activate_register(5);
        assert_eq!(rtc.current_register(), RtcRegister::Hours);
    }

    #[test]
    fn perform_tick_counts_whole_seconds() {
        let mut rtc = GbRtc::new(1_000);
        rtc.perform_tick(1_000 + 999_999);
        assert_eq!(rtc.real().seconds(), 0);
        rtc.perform_tick(1_000 + 1_000_000);
        assert_eq!(rtc.real().seconds(), 1);
        rtc.perform_tick(1_000 + 61_500_000);
        assert_eq!(rtc.real().seconds(), 1);
        assert_eq!(rtc.real().minutes(), 1);
        assert_eq!(rtc.timestamp(), 61);
    }

    #[test]
    fn seconds_write_resets_phase() {
        let mut rtc = GbRtc::new(0);
        rtc.perform_tick(900_000);
        rtc.write_register(10, 900_000);
        rtc.perform_tick(1_800_000);
        assert_eq!(rtc.real().seconds(), 10);
        rtc.perform_tick(1_900_000);
        assert_eq!(rtc.real().seconds(), 11);
    }

    #[test]
    fn halt_stops_the_clock_but_not_the_timestamp() {
        let mut rtc = GbRtc::new(0);
        rtc.activate_register(4);
        rtc.write_register(CONTROL_HALT, 0);
        rtc.perform_tick(5_000_000);
        assert_eq!(rtc.real().seconds(), 0);
        assert_eq!(rtc.timestamp(), 5);

        rtc.write_register(0, 5_000_000);
        rtc.perform_tick(7_000_000);
        assert_eq!(rtc.real().seconds(), 2);
    }

    #[test]
    fn latch_copies_real_registers() {
        let mut rtc = GbRtc::new(0);
        rtc.write_register(45, 0);
        assert_eq!(rtc.latched().seconds(), 0);
        rtc.latch();
        assert_eq!(rtc.latched().seconds(), 45);
    }

    #[test]
    fn advance_to_new_timestamp_applies_difference() {
        let base = RtcSnapshot {
            real: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            timestamp: 1_000_000,
        };
        let mut rtc = GbRtc::from_snapshot(&base, 0);

        let mut expected = base.real;
        for _ in 0..(3 * 86_400 + 3_725) {
            expected.tick();
        }

        rtc.advance_to_new_timestamp(1_000_000 + 3 * 86_400 + 3_725);
        assert_eq!(*rtc.real(), expected);
        assert_eq!(rtc.real().days(), 3);
        assert_eq!(rtc.real().hours(), 1);
        assert_eq!(rtc.real().minutes(), 2);
        assert_eq!(rtc.real().seconds(), 5);
    }

    #[test]
    fn advance_to_older_timestamp_only_moves_timestamp() {
        let mut rtc = GbRtc::new(0);
        rtc.advance_to_new_timestamp(500);
        assert_eq!((rtc.real().minutes(), rtc.real().seconds()), (8, 20));

        rtc.advance_to_new_timestamp(100);
        assert_eq!(rtc.timestamp(), 100);
        assert_eq!((rtc.real().minutes(), rtc.real().seconds()), (8, 20));
    }

    #[test]
    fn snapshot_rejects_bad_magic() {
        let mut rtc = GbRtc::new(0);
        rtc.write_register(12, 0);
        let mut bytes = rtc.snapshot().to_bytes();
        assert_eq!(bytes.len(), SNAPSHOT_LEN);
        assert_eq!(RtcSnapshot::from_bytes(&bytes).ok(), Some(rtc.snapshot()));

        bytes[0] = b'X';
        assert!(matches!(
            RtcSnapshot::from_bytes(&bytes),
            Err(Error::InvalidRtcSnapshot)
        ));
    }

    #[test]
    fn leap_day_breaks_down() {
        let tp = TimePoint::from_timestamp(951_782_400);
        assert_eq!((tp.year, tp.month, tp.day), (30, 1, 28));
        assert_eq!((tp.hour, tp.minute, tp.second), (0, 0, 0));
        assert_eq!(tp.to_timestamp(), 951_782_400);
    }

    #[test]
    fn time_point_round_trips_end_of_year() {
        let tp = TimePoint {
            second: 59,
            minute: 59,
            hour: 23,
            day: 30,
            month: 11,
            year: 54,
        };
        assert_eq!(TimePoint::from_timestamp(tp.to_timestamp()), tp);
    }
}

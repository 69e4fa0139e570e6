use hifitime::{Epoch, Unit};

/// Grid slot duration, in minutes
pub const SLOT_MINUTES: u8 = 10;

/// Floors this UTC [Epoch] down to the 10' slot it belongs to.
pub fn floor_to_slot(t: Epoch) -> Epoch {
    let (y, m, d, hh, mm, _, _) = t.to_gregorian_utc();
    Epoch::from_gregorian_utc(y, m, d, hh, mm - mm % SLOT_MINUTES, 0, 0)
}

/// Returns the slot preceding this (floored) slot.
pub fn previous_slot(slot: Epoch) -> Epoch {
    floor_to_slot(slot - (SLOT_MINUTES as i64) * Unit::Minute)
}

/// Formats a UTC [Epoch] as "YYYY-MM-DD HH:MM:SS", the grid service slot key.
pub fn slot_key(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, _) = t.to_gregorian_utc();
    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, hh, mm, ss)
}

/// Formats a UTC [Epoch] as ISO8601 "YYYY-MM-DDTHH:MM:SSZ".
pub fn iso8601(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, _) = t.to_gregorian_utc();
    format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z", y, m, d, hh, mm, ss)
}

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, SerdeErr};

use crate::constants::RATE_FIELD_BIT_SIZE;

const MIN_RATE_TO_SERVER: u32 = 8;
const MAX_RATE_TO_SERVER: u32 = 32;
const MIN_RATE_TO_CLIENT: u32 = 1;
const MAX_RATE_TO_CLIENT: u32 = 32;
const MIN_PACKET_SIZE: u32 = 100;
const MAX_PACKET_SIZE: u32 = 450;

/// Milliseconds per packet for a rate in packets per second
fn update_delay_for(rate: u32) -> u32 {
    1024 / rate
}

/// How often and how large packets may be sent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetRate {
    pub update_delay: u32,
    pub packet_size: u32,
}

impl Default for NetRate {
    fn default() -> Self {
        Self {
            update_delay: 102,
            packet_size: 200,
        }
    }
}

/// Locally preferred packet rates (packets per second) and packet size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatePrefs {
    pub packet_rate_to_server: u32,
    pub packet_rate_to_client: u32,
    pub packet_size: u32,
}

impl RatePrefs {
    /// The same preferences pulled into the supported ranges
    pub fn clamped(&self) -> Self {
        Self {
            packet_rate_to_server: self
                .packet_rate_to_server
                .clamp(MIN_RATE_TO_SERVER, MAX_RATE_TO_SERVER),
            packet_rate_to_client: self
                .packet_rate_to_client
                .clamp(MIN_RATE_TO_CLIENT, MAX_RATE_TO_CLIENT),
            packet_size: self.packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE),
        }
    }

    pub fn update_delay_to_server(&self) -> u32 {
        update_delay_for(self.packet_rate_to_server)
    }

    pub fn update_delay_to_client(&self) -> u32 {
        update_delay_for(self.packet_rate_to_client)
    }
}

impl Default for RatePrefs {
    fn default() -> Self {
        Self {
            packet_rate_to_server: 32,
            packet_rate_to_client: 10,
            packet_size: 508,
        }
    }
}

/// Rate negotiation of one connection.
///
/// Each side advertises the most it is willing to receive (the max rate)
/// and the rate it wants the peer to use (the current rate). Either is
/// written into the next Data packet after it changes, and again if that
/// packet is lost.
#[derive(Clone, Debug)]
pub struct RateControl {
    prefs: RatePrefs,
    current: NetRate,
    max: NetRate,
    rate_changed: bool,
    max_rate_changed: bool,
}

impl RateControl {
    pub fn new(prefs: RatePrefs) -> Self {
        let mut control = Self {
            prefs: prefs.clamped(),
            current: NetRate::default(),
            max: NetRate::default(),
            rate_changed: false,
            max_rate_changed: false,
        };
        control.check_max_rate();
        control
    }

    pub fn prefs(&self) -> &RatePrefs {
        &self.prefs
    }

    pub fn current(&self) -> NetRate {
        self.current
    }

    pub fn max(&self) -> NetRate {
        self.max
    }

    pub fn set_prefs(&mut self, prefs: RatePrefs) {
        self.prefs = prefs;
        self.check_max_rate();
    }

    /// Clamps the preferences and recomputes the advertised max rate,
    /// flagging it for sending if it moved
    pub fn check_max_rate(&mut self) {
        self.prefs = self.prefs.clamped();
        let max = NetRate {
            update_delay: self.prefs.update_delay_to_client(),
            packet_size: self.prefs.packet_size,
        };
        if max != self.max {
            self.max = max;
            self.max_rate_changed = true;
        }
    }

    /// Writes both rate fields, clearing their changed flags. Returns the
    /// flags to remember in the packet's notify.
    pub fn write(&mut self, writer: &mut dyn BitWrite) -> (bool, bool) {
        let flags = (self.rate_changed, self.max_rate_changed);

        writer.write_bit(self.rate_changed);
        if self.rate_changed {
            write_rate(writer, &self.current);
            self.rate_changed = false;
        }
        writer.write_bit(self.max_rate_changed);
        if self.max_rate_changed {
            write_rate(writer, &self.max);
            self.max_rate_changed = false;
        }

        flags
    }

    pub fn read(&mut self, reader: &mut BitReader) -> Result<(), SerdeErr> {
        if reader.read_bit()? {
            let requested = read_rate(reader)?;
            // SECURITY: peer supplied; never pace faster or larger than we support
            self.current = NetRate {
                update_delay: requested
                    .update_delay
                    .max(update_delay_for(MAX_RATE_TO_SERVER)),
                packet_size: requested.packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE),
            };
        }

        if reader.read_bit()? {
            let peer_max = read_rate(reader)?;
            let agreed = NetRate {
                update_delay: peer_max.update_delay.max(self.max.update_delay),
                packet_size: peer_max.packet_size.min(self.max.packet_size),
            };
            if agreed != self.current {
                self.current = agreed;
                self.rate_changed = true;
            }
        }
        Ok(())
    }

    /// The packet that carried the given flags was lost
    pub fn packet_dropped(&mut self, rate_changed: bool, max_rate_changed: bool) {
        self.rate_changed |= rate_changed;
        self.max_rate_changed |= max_rate_changed;
    }
}

impl Default for RateControl {
    fn default() -> Self {
        Self::new(RatePrefs::default())
    }
}

fn write_rate(writer: &mut dyn BitWrite, rate: &NetRate) {
    write_bits(writer, rate.update_delay, RATE_FIELD_BIT_SIZE);
    write_bits(writer, rate.packet_size, RATE_FIELD_BIT_SIZE);
}

fn read_rate(reader: &mut BitReader) -> Result<NetRate, SerdeErr> {
    Ok(NetRate {
        update_delay: read_bits(reader, RATE_FIELD_BIT_SIZE)?,
        packet_size: read_bits(reader, RATE_FIELD_BIT_SIZE)?,
    })
}

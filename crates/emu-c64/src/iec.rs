//! IEC serial bus connecting the C64 to the 1541 drive (and any further
//! peripherals daisy-chained onto the same three wires).
//!
//! Three open-collector lines: ATN, CLK, DATA. Each participant can
//! independently pull a line low; a line reads high only when nobody pulls
//! it low. This matches real hardware, where each line has a pull-up
//! resistor and any device can ground it. The number of participants is
//! not fixed at two — CIA2 (the C64 side), the 1541, and any other IEC
//! peripheral all contribute to the same wired-AND.

/// A participant's slot on the bus, returned by [`IecBus::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IecParticipant(usize);

/// IEC serial bus: a wired-AND of ATN/CLK/DATA across any number of
/// participants.
pub struct IecBus {
    atn_pulls: Vec<bool>,
    clk_pulls: Vec<bool>,
    data_pulls: Vec<bool>,
}

impl IecBus {
    /// Create a bus with no participants yet; all lines read high.
    #[must_use]
    pub fn new() -> Self {
        Self {
            atn_pulls: Vec::new(),
            clk_pulls: Vec::new(),
            data_pulls: Vec::new(),
        }
    }

    /// Register a new participant (none of its lines pulled low) and
    /// return the handle it uses to drive the bus.
    pub fn register(&mut self) -> IecParticipant {
        self.atn_pulls.push(false);
        self.clk_pulls.push(false);
        self.data_pulls.push(false);
        IecParticipant(self.atn_pulls.len() - 1)
    }

    pub fn set_atn(&mut self, who: IecParticipant, pull_low: bool) {
        let before = self.atn();
        self.atn_pulls[who.0] = pull_low;
        if before != self.atn() {
            log::debug!("IEC ATN -> {}", if self.atn() { "high" } else { "low" });
        }
    }

    pub fn set_clk(&mut self, who: IecParticipant, pull_low: bool) {
        let before = self.clk();
        self.clk_pulls[who.0] = pull_low;
        if before != self.clk() {
            log::debug!("IEC CLK -> {}", if self.clk() { "high" } else { "low" });
        }
    }

    pub fn set_data(&mut self, who: IecParticipant, pull_low: bool) {
        let before = self.data();
        self.data_pulls[who.0] = pull_low;
        if before != self.data() {
            log::debug!("IEC DATA -> {}", if self.data() { "high" } else { "low" });
        }
    }

    /// ATN line state. High when nobody pulls it low.
    #[must_use]
    pub fn atn(&self) -> bool {
        !self.atn_pulls.iter().any(|&p| p)
    }

    /// CLK line state. High when nobody pulls it low.
    #[must_use]
    pub fn clk(&self) -> bool {
        !self.clk_pulls.iter().any(|&p| p)
    }

    /// DATA line state. High when nobody pulls it low.
    #[must_use]
    pub fn data(&self) -> bool {
        !self.data_pulls.iter().any(|&p| p)
    }
}

impl Default for IecBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_start_high() {
        let mut bus = IecBus::new();
        let _c64 = bus.register();
        let _drive = bus.register();
        assert!(bus.atn());
        assert!(bus.clk());
        assert!(bus.data());
    }

    #[test]
    fn one_participant_pulls_low() {
        let mut bus = IecBus::new();
        let c64 = bus.register();
        let _drive = bus.register();
        bus.set_atn(c64, true);
        assert!(!bus.atn());
        assert!(bus.clk());
        assert!(bus.data());
    }

    #[test]
    fn wired_and_needs_every_puller_released() {
        let mut bus = IecBus::new();
        let c64 = bus.register();
        let drive = bus.register();
        bus.set_clk(c64, true);
        bus.set_clk(drive, true);
        assert!(!bus.clk());
        bus.set_clk(c64, false);
        assert!(!bus.clk());
        bus.set_clk(drive, false);
        assert!(bus.clk());
    }

    #[test]
    fn third_participant_joins_the_wired_and() {
        let mut bus = IecBus::new();
        let c64 = bus.register();
        let drive = bus.register();
        let printer = bus.register();
        bus.set_data(c64, false);
        bus.set_data(drive, false);
        assert!(bus.data());
        bus.set_data(printer, true);
        assert!(!bus.data());
    }

    #[test]
    fn lines_are_independent() {
        let mut bus = IecBus::new();
        let c64 = bus.register();
        let drive = bus.register();
        bus.set_atn(c64, true);
        bus.set_data(drive, true);
        assert!(!bus.atn());
        assert!(bus.clk());
        assert!(!bus.data());
    }
}

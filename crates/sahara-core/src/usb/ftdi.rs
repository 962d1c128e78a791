//! FTDI FT232-style vendor requests.
//!
//! Host serial drivers (ftdi_sio, libftdi, D2XX) probe these before opening
//! a port, so the replies have to match the real chip byte for byte.

use tracing::info;

use super::dispatch::{Handler, HandlerTable, VendorHandlers};
use super::request::ControlRequest;

pub const FTDI_SIO_RESET: u8 = 0x00;
pub const FTDI_SIO_MODEM_CTRL: u8 = 0x01;
pub const FTDI_SIO_SET_FLOW_CTRL: u8 = 0x02;
pub const FTDI_SIO_SET_BAUD_RATE: u8 = 0x03;
pub const FTDI_SIO_SET_DATA: u8 = 0x04;
pub const FTDI_SIO_GET_MODEM_STATUS: u8 = 0x05;
pub const FTDI_SIO_SET_EVENT_CHAR: u8 = 0x06;
pub const FTDI_SIO_SET_ERROR_CHAR: u8 = 0x07;
pub const FTDI_SIO_SET_LATENCY_TIMER: u8 = 0x09;
pub const FTDI_SIO_GET_LATENCY_TIMER: u8 = 0x0A;
pub const FTDI_SIO_READ_EEPROM: u8 = 0x90;

/// Canned EEPROM word.
pub const FTDI_EEPROM_WORD: [u8; 2] = [0x31, 0x60];

/// Device-local line state touched by the vendor handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtdiVendor {
    pub latency_timer: u8,
    pub data: u16,
    pub baudrate: u16,
    pub flow_control: u16,
    pub dtr: u8,
    pub rts: u8,
    pub dtr_enable: u8,
    pub rts_enable: u8,
}

impl Default for FtdiVendor {
    fn default() -> Self {
        Self {
            latency_timer: 0x01,
            data: 0,
            baudrate: 0,
            flow_control: 0,
            dtr: 0,
            rts: 0,
            dtr_enable: 0,
            rts_enable: 0,
        }
    }
}

impl FtdiVendor {
    fn reset(&mut self, _req: &ControlRequest) -> Vec<u8> {
        Vec::new()
    }

    fn modem_ctrl(&mut self, req: &ControlRequest) -> Vec<u8> {
        self.dtr = (req.value & 0x0001) as u8;
        self.rts = ((req.value & 0x0002) >> 1) as u8;
        self.dtr_enable = ((req.value & 0x0100) >> 8) as u8;
        self.rts_enable = ((req.value & 0x0200) >> 9) as u8;
        if self.dtr_enable != 0 {
            info!(dtr = self.dtr, "DTR is enabled");
        }
        if self.rts_enable != 0 {
            info!(rts = self.rts, "RTS is enabled");
        }
        Vec::new()
    }

    fn set_flow_ctrl(&mut self, req: &ControlRequest) -> Vec<u8> {
        self.flow_control = req.value;
        if req.value == 0 {
            info!("SET_FLOW_CTRL to no handshaking");
        }
        if req.value & 0x0001 != 0 {
            info!("SET_FLOW_CTRL for RTS/CTS handshaking");
        }
        if req.value & 0x0002 != 0 {
            info!("SET_FLOW_CTRL for DTR/DSR handshaking");
        }
        if req.value & 0x0004 != 0 {
            info!("SET_FLOW_CTRL for XON/XOFF handshaking");
        }
        Vec::new()
    }

    fn set_baud_rate(&mut self, req: &ControlRequest) -> Vec<u8> {
        // The chip shares bit 0 of wValue between the divisor and DTR.
        self.dtr = (req.value & 0x0001) as u8;
        self.baudrate = req.value;
        info!(
            baudrate = %format!("0x{:X}", self.baudrate),
            dtr = self.dtr,
            "Baud rate set"
        );
        Vec::new()
    }

    fn set_data(&mut self, req: &ControlRequest) -> Vec<u8> {
        self.data = req.value;
        Vec::new()
    }

    fn get_modem_status(&mut self, req: &ControlRequest) -> Vec<u8> {
        vec![0u8; req.length as usize]
    }

    fn set_event_char(&mut self, _req: &ControlRequest) -> Vec<u8> {
        Vec::new()
    }

    fn set_error_char(&mut self, _req: &ControlRequest) -> Vec<u8> {
        Vec::new()
    }

    fn set_latency_timer(&mut self, req: &ControlRequest) -> Vec<u8> {
        self.latency_timer = (req.value & 0xFF) as u8;
        Vec::new()
    }

    fn get_latency_timer(&mut self, _req: &ControlRequest) -> Vec<u8> {
        vec![self.latency_timer]
    }

    fn read_eeprom(&mut self, _req: &ControlRequest) -> Vec<u8> {
        FTDI_EEPROM_WORD.to_vec()
    }
}

impl VendorHandlers for FtdiVendor {
    const NAME: &'static str = "FtdiVendor";

    fn handler_table() -> HandlerTable<Self> {
        let entries: [(u8, Handler<Self>); 11] = [
            (FTDI_SIO_RESET, Self::reset),
            (FTDI_SIO_MODEM_CTRL, Self::modem_ctrl),
            (FTDI_SIO_SET_FLOW_CTRL, Self::set_flow_ctrl),
            (FTDI_SIO_SET_BAUD_RATE, Self::set_baud_rate),
            (FTDI_SIO_SET_DATA, Self::set_data),
            (FTDI_SIO_GET_MODEM_STATUS, Self::get_modem_status),
            (FTDI_SIO_SET_EVENT_CHAR, Self::set_event_char),
            (FTDI_SIO_SET_ERROR_CHAR, Self::set_error_char),
            (FTDI_SIO_SET_LATENCY_TIMER, Self::set_latency_timer),
            (FTDI_SIO_GET_LATENCY_TIMER, Self::get_latency_timer),
            (FTDI_SIO_READ_EEPROM, Self::read_eeprom),
        ];
        HandlerTable::new(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::dispatch::{ControlDispatcher, ControlResponse};
    use crate::usb::request::RequestType;

    fn out(request: u8, value: u16) -> ControlRequest {
        ControlRequest::new(RequestType::VENDOR_OUT, request, value, 0, 0)
    }

    fn input(request: u8, length: u16) -> ControlRequest {
        ControlRequest::new(RequestType::VENDOR_IN, request, 0, 0, length)
    }

    #[test]
    fn test_table_covers_all_codes() {
        assert_eq!(FtdiVendor::handler_table().len(), 11);
        assert!(FtdiVendor::handler_table().get(0x08).is_none());
    }

    #[test]
    fn test_latency_timer_roundtrip() {
        let mut d = ControlDispatcher::new(FtdiVendor::default());
        assert_eq!(
            d.dispatch(&input(FTDI_SIO_GET_LATENCY_TIMER, 1)),
            ControlResponse::Data(vec![0x01])
        );
        assert_eq!(
            d.dispatch(&out(FTDI_SIO_SET_LATENCY_TIMER, 0x1210)),
            ControlResponse::Data(vec![])
        );
        assert_eq!(
            d.dispatch(&input(FTDI_SIO_GET_LATENCY_TIMER, 1)),
            ControlResponse::Data(vec![0x10])
        );
    }

    #[test]
    fn test_modem_ctrl_bits() {
        let mut d = ControlDispatcher::new(FtdiVendor::default());
        d.dispatch(&out(FTDI_SIO_MODEM_CTRL, 0x0303));
        let s = d.state();
        assert_eq!((s.dtr, s.rts, s.dtr_enable, s.rts_enable), (1, 1, 1, 1));

        d.dispatch(&out(FTDI_SIO_MODEM_CTRL, 0x0100));
        let s = d.state();
        assert_eq!((s.dtr, s.rts, s.dtr_enable, s.rts_enable), (0, 0, 1, 0));
    }

    #[test]
    fn test_baud_rate_sets_dtr_from_bit0() {
        let mut d = ControlDispatcher::new(FtdiVendor::default());
        d.dispatch(&out(FTDI_SIO_SET_BAUD_RATE, 0x4139));
        assert_eq!(d.state().baudrate, 0x4139);
        assert_eq!(d.state().dtr, 1);
    }

    #[test]
    fn test_fixed_replies() {
        let mut d = ControlDispatcher::new(FtdiVendor::default());
        assert_eq!(
            d.dispatch(&input(FTDI_SIO_GET_MODEM_STATUS, 2)),
            ControlResponse::Data(vec![0, 0])
        );
        assert_eq!(
            d.dispatch(&input(FTDI_SIO_READ_EEPROM, 2)),
            ControlResponse::Data(vec![0x31, 0x60])
        );
        assert_eq!(
            d.dispatch(&out(FTDI_SIO_RESET, 0)),
            ControlResponse::Data(vec![])
        );
        assert_eq!(
            d.dispatch(&out(FTDI_SIO_SET_DATA, 0x0008)),
            ControlResponse::Data(vec![])
        );
        assert_eq!(d.state().data, 8);
        assert_eq!(d.dispatch(&out(0x42, 0)), ControlResponse::Stall);
    }

    #[test]
    fn test_flow_control_stored() {
        let mut d = ControlDispatcher::new(FtdiVendor::default());
        d.dispatch(&out(FTDI_SIO_SET_FLOW_CTRL, 0x0101));
        assert_eq!(d.state().flow_control, 0x0101);
    }
}

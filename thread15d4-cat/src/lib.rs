use colored::*;
use thread15d4::crypto::{Key, KEY_LEN};
use thread15d4::key_manager::{key_index, KeySet};
use thread15d4::mac::{security, ThreadBeacon};
use thread15d4::{Error, Result};
use thread15d4_frame::*;

struct Writer<'b> {
    buffer: &'b mut String,
    indent: usize,
}

impl<'b> Writer<'b> {
    fn new(buffer: &'b mut String) -> Self {
        Self { buffer, indent: 0 }
    }

    fn increase_indent(&mut self) {
        self.indent += 2;
    }

    fn decrease_indent(&mut self) {
        self.indent -= 2;
    }

    fn write(&mut self, s: String) {
        self.buffer.push_str(&" ".repeat(self.indent));
        self.buffer.push_str(&s);
    }

    fn writeln(&mut self, s: String) {
        self.write(s);
        self.buffer.push('\n');
    }

    fn section(&mut self, title: &str) {
        self.writeln(title.underline().bold().to_string());
    }

    fn field(&mut self, name: &str, value: impl core::fmt::Display) {
        self.writeln(format!("{}: {}", name.bold(), value));
    }
}

/// Key material used to authenticate and decrypt secured frames.
#[derive(Debug, Clone, Copy)]
pub struct Decryption {
    pub master_key: Key,
    pub key_sequence: u32,
    /// Sender of frames carrying a short source address.
    pub source: Option<ExtAddress>,
}

impl Decryption {
    /// Parse a hex encoded master key.
    pub fn from_hex(key: &str, key_sequence: u32, source: Option<ExtAddress>) -> Result<Self> {
        let bytes = hex::decode(key.trim()).map_err(|_| Error::InvalidArgs)?;
        if bytes.len() != KEY_LEN {
            return Err(Error::InvalidArgs);
        }
        let mut master_key = [0u8; KEY_LEN];
        master_key.copy_from_slice(&bytes);
        Ok(Self {
            master_key,
            key_sequence,
            source,
        })
    }
}

/// Parse an extended address written as 16 hex digits, with or without
/// colons.
pub fn parse_ext_address(input: &str) -> Result<ExtAddress> {
    let digits: String = input.chars().filter(|c| *c != ':').collect();
    let bytes = hex::decode(digits).map_err(|_| Error::InvalidArgs)?;
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| Error::InvalidArgs)?;
    Ok(ExtAddress::new(bytes))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Options {
    /// The input ends with a Frame Check Sequence.
    pub fcs: bool,
    pub decryption: Option<Decryption>,
}

enum Unsecured {
    Valid(u32),
    Invalid,
    UnknownSource,
}

pub struct FrameParser {}

impl FrameParser {
    pub fn parse_hex(input: &str) -> Result<String> {
        Self::parse_hex_with(input, &Options::default())
    }

    pub fn parse_hex_with(input: &str, options: &Options) -> Result<String> {
        let data = hex::decode(input.trim()).map_err(|_| Error::Parse)?;
        Self::parse_with(&data, options)
    }

    pub fn parse(input: &[u8]) -> Result<String> {
        Self::parse_with(input, &Options::default())
    }

    pub fn parse_with(input: &[u8], options: &Options) -> Result<String> {
        let (content, fcs) = if options.fcs {
            let with_fcs = FrameWithFcs::new_unchecked(input);
            if !with_fcs.check_len() {
                return Err(Error::Parse);
            }
            (
                &input[..input.len() - FCS_LEN],
                Some((with_fcs.fcs(), with_fcs.check_fcs())),
            )
        } else {
            (input, None)
        };

        let mut data = content.to_vec();
        let unsecured = match &options.decryption {
            Some(decryption) => Self::unsecure(&mut data, decryption)?,
            None => None,
        };

        let frame = Frame::new(&data[..])?;
        let mut buffer = String::new();
        let mut w = Writer::new(&mut buffer);

        let fc = frame.frame_control();

        // -----------------------------------------------------------------
        // Frame Control
        // -----------------------------------------------------------------
        w.section("Frame Control");
        w.increase_indent();
        w.field("frame type", format!("{:?}", fc.frame_type()).bright_blue());
        w.field("security", fc.security_enabled() as usize);
        w.field("frame pending", fc.frame_pending() as usize);
        w.field("ack request", fc.ack_request() as usize);
        w.field("pan id compression", fc.pan_id_compression() as usize);
        w.field("dst addressing mode", format!("{:?}", fc.dst_addressing_mode()));
        w.field("src addressing mode", format!("{:?}", fc.src_addressing_mode()));
        w.field(
            "frame version",
            format!("{} ({:?})", fc.frame_version() as usize, fc.frame_version()),
        );
        w.decrease_indent();

        // -----------------------------------------------------------------
        // Sequence Number
        // -----------------------------------------------------------------
        w.section("Sequence Number");
        w.increase_indent();
        w.field("sequence number", frame.sequence_number());
        w.decrease_indent();

        // -----------------------------------------------------------------
        // Addressing
        // -----------------------------------------------------------------
        let addr = frame.addressing();
        if addr.dst_address().is_some() || addr.src_address().is_some() {
            w.section("Addressing");
            w.increase_indent();

            if let Some(dst_pan_id) = addr.dst_pan_id() {
                w.field("dst pan id", format!("{:04x}", dst_pan_id));
            }
            if let Some(dst_addr) = addr.dst_address() {
                let broadcast = if dst_addr.is_broadcast() {
                    " (broadcast)"
                } else {
                    ""
                };
                w.field("dst addr", format!("{}{}", dst_addr, broadcast));
            }
            if let Some(src_pan_id) = addr.src_pan_id() {
                w.field("src pan id", format!("{:04x}", src_pan_id));
            }
            if let Some(src_addr) = addr.src_address() {
                w.field("src addr", src_addr);
            }
            w.decrease_indent();
        }

        // -----------------------------------------------------------------
        // Auxiliary Security Header
        // -----------------------------------------------------------------
        if let Some(aux) = frame.auxiliary_security_header() {
            let control = aux.security_control();
            w.section("Auxiliary Security Header");
            w.increase_indent();
            w.field("security level", format!("{:?}", control.security_level()));
            w.field("key id mode", format!("{:?}", control.key_id_mode()));
            w.field("frame counter", aux.frame_counter());
            if let Some(source) = aux.key_source() {
                w.field("key source", hex::encode(source));
            }
            if let Some(index) = aux.key_index() {
                w.field("key index", index);
            }
            match unsecured {
                Some(Unsecured::Valid(key_sequence)) => {
                    w.field("key sequence", key_sequence);
                    w.field("mic", "valid".green());
                }
                Some(Unsecured::Invalid) => w.field("mic", "invalid".red()),
                Some(Unsecured::UnknownSource) => w.field("mic", "unknown source".yellow()),
                None => {}
            }
            w.decrease_indent();
        }

        // -----------------------------------------------------------------
        // MAC Command
        // -----------------------------------------------------------------
        if let Some(id) = frame.command_id() {
            w.section("Command");
            w.increase_indent();
            w.field("command id", format!("{:?}", id).bright_blue());
            let readable = !fc.security_enabled() || matches!(unsecured, Some(Unsecured::Valid(_)));
            if readable {
                Self::write_command(&mut w, id, frame.payload());
            }
            w.decrease_indent();
        }

        // -----------------------------------------------------------------
        // Beacon
        // -----------------------------------------------------------------
        if fc.frame_type() == FrameType::Beacon {
            Self::write_beacon(&mut w, frame.payload());
        }

        // -----------------------------------------------------------------
        // Payload
        // -----------------------------------------------------------------
        if !frame.payload().is_empty() && frame.command_id().is_none() {
            w.section("Payload");
            w.increase_indent();
            w.writeln(format!("{:x?}", frame.payload()));
            w.decrease_indent();
        }
        if !frame.mic().is_empty() {
            w.section("MIC");
            w.increase_indent();
            w.writeln(hex::encode(frame.mic()));
            w.decrease_indent();
        }

        if let Some((fcs, valid)) = fcs {
            w.section("Frame Check Sequence");
            w.increase_indent();
            let status = if valid { "valid".green() } else { "invalid".red() };
            w.field("fcs", format!("{:04x} ({})", fcs, status));
            w.decrease_indent();
        }

        Ok(buffer)
    }

    /// Authenticate and decrypt `data` in place when it is secured.
    fn unsecure(data: &mut [u8], decryption: &Decryption) -> Result<Option<Unsecured>> {
        let frame = Frame::new(&data[..])?;
        if !frame.frame_control().security_enabled() {
            return Ok(None);
        }
        let source = match frame.addressing().src_address() {
            Some(Address::Extended(ext)) => Some(ext),
            _ => decryption.source,
        };
        let Some(source) = source else {
            return Ok(Some(Unsecured::UnknownSource));
        };

        // the key index identifies the sequence relative to the given one
        let info = security::security_info(data)?;
        let base = decryption.key_sequence;
        let key_sequence = [base, base.wrapping_add(1), base.wrapping_sub(1)]
            .into_iter()
            .find(|seq| Some(key_index(*seq)) == info.key_index)
            .unwrap_or(base);
        let keys = KeySet::derive(&decryption.master_key, key_sequence)?;

        let mut scratch = data.to_vec();
        match security::unsecure_frame(&mut scratch, &keys.mac, &source) {
            Ok(()) => {
                data.copy_from_slice(&scratch);
                Ok(Some(Unsecured::Valid(key_sequence)))
            }
            Err(_) => Ok(Some(Unsecured::Invalid)),
        }
    }

    fn write_command(w: &mut Writer, id: CommandId, payload: &[u8]) {
        match id {
            CommandId::AssociationRequest => match AssociationRequest::new(payload) {
                Ok(request) => w.field("capabilities", format!("{:?}", request.capabilities())),
                Err(_) => w.writeln("invalid".to_string()),
            },
            CommandId::AssociationResponse => match AssociationResponse::new(payload) {
                Ok(response) => {
                    w.field("short address", format!("{:04x}", response.short_address()));
                    w.field("status", format!("{:?}", response.status()));
                }
                Err(_) => w.writeln("invalid".to_string()),
            },
            CommandId::DisassociationNotification => match Disassociation::new(payload) {
                Ok(disassociation) => w.field("reason", disassociation.reason()),
                Err(_) => w.writeln("invalid".to_string()),
            },
            CommandId::CoordinatorRealignment => match CoordinatorRealignment::new(payload) {
                Ok(realignment) => {
                    w.field("pan id", format!("{:04x}", realignment.pan_id()));
                    w.field(
                        "coordinator short address",
                        format!("{:04x}", realignment.coordinator_short_address()),
                    );
                    w.field("channel", realignment.channel());
                    w.field("short address", format!("{:04x}", realignment.short_address()));
                }
                Err(_) => w.writeln("invalid".to_string()),
            },
            _ if payload.is_empty() => {}
            _ => w.writeln(format!("{:x?}", payload)),
        }
    }

    fn write_beacon(w: &mut Writer, payload: &[u8]) {
        let Ok(beacon) = BeaconPayload::new(payload) else {
            w.section("Beacon");
            w.increase_indent();
            w.writeln("invalid".to_string());
            w.decrease_indent();
            return;
        };

        let spec = beacon.superframe_specification();
        w.section("Beacon");
        w.increase_indent();
        w.field("beacon order", spec.beacon_order());
        w.field("superframe order", spec.superframe_order());
        w.field("pan coordinator", spec.pan_coordinator() as usize);
        w.field("association permit", spec.association_permit() as usize);
        w.field("gts descriptors", beacon.gts_count());
        w.decrease_indent();

        if let Ok(thread) = ThreadBeacon::parse(beacon.payload()) {
            w.section("Thread Beacon");
            w.increase_indent();
            w.field("version", thread.version);
            w.field("joinable", thread.joinable as usize);
            w.field("network name", thread.network_name.as_str());
            w.field("extended pan id", hex::encode(thread.extended_pan_id));
            w.decrease_indent();
        }
    }
}

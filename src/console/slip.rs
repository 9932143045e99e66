//! SLIP framing (RFC 1055) for OSC over TCP.
//!
//! Every message is terminated with `END` (0xC0); literal `END`/`ESC` bytes in
//! the payload are escaped as `ESC ESC_END` / `ESC ESC_ESC`.

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Encode one payload as a single SLIP frame, including the trailing `END`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    for &byte in payload {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            other => out.push(other),
        }
    }
    out.push(END);
    out
}

/// Incremental SLIP decoder.
///
/// A TCP segment may carry several frames, or a fraction of one; `feed`
/// returns every frame completed by the new bytes and buffers the rest.
#[derive(Debug, Default)]
pub struct SlipDecoder {
    current: Vec<u8>,
    escaped: bool,
}

impl SlipDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if self.escaped {
                self.escaped = false;
                match byte {
                    ESC_END => self.current.push(END),
                    ESC_ESC => self.current.push(ESC),
                    // Protocol violation; keep the byte rather than lose data.
                    other => self.current.push(other),
                }
                continue;
            }
            match byte {
                END => {
                    if !self.current.is_empty() {
                        frames.push(std::mem::take(&mut self.current));
                    }
                }
                ESC => self.escaped = true,
                other => self.current.push(other),
            }
        }
        frames
    }
}

//! ESC/POS command builder
//!
//! Fluent API for building thermal-printer byte sequences. Alongside the
//! bytes the builder keeps a plain-text copy of everything printed, used as
//! the on-screen preview.
//!
//! Text goes to the printer in Windows-1252 (ESC t 16), which covers the
//! accented letters of Western European menus and the euro sign.

use encoding_rs::WINDOWS_1252;

/// ESC t 16 selects WPC1252, matching [`encode_text`].
const CODE_PAGE_SELECT: [u8; 3] = [0x1B, 0x74, 16];

/// ESC/POS command builder.
///
/// Common widths:
/// - 58mm paper: 32 characters
/// - 80mm paper: 48 characters
pub struct EscPosBuilder {
    buf: Vec<u8>,
    preview: String,
    width: usize,
}

/// Display width of `s` in printer columns: one column per encoded byte.
pub fn text_width(s: &str) -> usize {
    encode_text(s).len()
}

/// Encodes `s` for the printer code page. Control characters and characters
/// the code page lacks become '?'.
pub fn encode_text(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut utf8 = [0u8; 4];
    for c in s.chars() {
        if c.is_control() {
            out.push(b'?');
            continue;
        }
        let (bytes, _, unmappable) = WINDOWS_1252.encode(c.encode_utf8(&mut utf8));
        if unmappable {
            out.push(b'?');
        } else {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

impl EscPosBuilder {
    pub fn new(width: usize) -> Self {
        let mut buf = Vec::with_capacity(2048);
        // ESC @ - initialize printer
        buf.extend_from_slice(&[0x1B, 0x40]);
        buf.extend_from_slice(&CODE_PAGE_SELECT);
        Self {
            buf,
            preview: String::new(),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    // === Text Output ===

    /// Raw text. Characters the printer's code page cannot show become '?'.
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.encode(s);
        self.preview.push_str(s);
        self
    }

    fn encode(&mut self, s: &str) {
        self.buf.extend_from_slice(&encode_text(s));
    }

    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.newline()
    }

    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self.preview.push('\n');
        self
    }

    pub fn feed(&mut self, lines: u8) -> &mut Self {
        // ESC d n - print and feed n lines
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        for _ in 0..lines {
            self.preview.push('\n');
        }
        self
    }

    // === Alignment ===

    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    /// Centered line. The preview pads with spaces since it has no
    /// alignment commands.
    pub fn line_center(&mut self, s: &str) -> &mut Self {
        self.center();
        let pad = self.width.saturating_sub(text_width(s)) / 2;
        self.encode(s);
        self.buf.push(b'\n');
        self.preview.push_str(&" ".repeat(pad));
        self.preview.push_str(s);
        self.preview.push('\n');
        self.left()
    }

    // === Text Style ===

    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    /// Double height only; the line keeps its width.
    pub fn double_height(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x01]);
        self
    }

    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x00]);
        self
    }

    // === Separators ===

    pub fn sep_double(&mut self) -> &mut Self {
        self.line(&"=".repeat(self.width))
    }

    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    // === Layout Helpers ===

    /// Left text left-aligned and right text right-aligned on one line.
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let lw = text_width(left);
        let rw = text_width(right);

        if lw + rw >= self.width {
            self.text(left);
            self.text(" ");
            self.line(right)
        } else {
            let spaces = self.width - lw - rw;
            self.text(left);
            self.text(&" ".repeat(spaces));
            self.line(right)
        }
    }

    // === Paper Control ===

    /// Feeds `lines` then cuts (GS V 66 n).
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x42, lines]);
        self.preview.push_str(&"- ".repeat(self.width / 2));
        self.preview.push('\n');
        self
    }

    // === Output ===

    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn build(self) -> (Vec<u8>, String) {
        (self.buf, self.preview)
    }
}

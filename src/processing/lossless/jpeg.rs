//! Lossless JPEG transcoding to progressive mode.
//!
//! Sequential Huffman JPEGs (baseline and extended) are entropy-decoded down to
//! their quantized DCT coefficients and written back as a progressive JPEG
//! with Huffman tables built for the image. Coefficients, quantization tables
//! and metadata segments are carried over unchanged, so the decoded pixels do
//! not change. Progressive, arithmetic-coded, lossless and 12-bit files are
//! left alone.

use std::fmt::Display;
use crate::utils::{ConverterError, ConverterResult};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DRI: u8 = 0xDD;
const DHT: u8 = 0xC4;
const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const SOF2: u8 = 0xC2;
const COM: u8 = 0xFE;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

/// Quantized coefficients of one 8x8 block, in zigzag order.
type Block = [i16; 64];

/// Largest number of blocks one interleaved MCU may hold.
const MAX_BLOCKS_PER_MCU: usize = 10;

/// Longest run of all-zero bands a single EOBRUN symbol can carry.
const MAX_EOBRUN: u32 = 0x7FFF;

fn corrupt(msg: impl Display) -> ConverterError {
    ConverterError::optimization(format!("Corrupt JPEG: {msg}"))
}

/// Rewrites a sequential JPEG as a progressive one without touching its
/// coefficients.
///
/// Returns `Ok(None)` for JPEG flavours that are kept as they are.
pub fn transcode_progressive(jpeg: &[u8]) -> ConverterResult<Option<Vec<u8>>> {
    let mut input = Segments { data: jpeg, pos: 0 };
    if input.next_marker()? != Some(SOI) {
        return Err(corrupt("missing SOI marker"));
    }

    let mut kept: Vec<(u8, &[u8])> = Vec::new();
    let mut dc_tables: [Option<HuffmanDecoder>; 4] = Default::default();
    let mut ac_tables: [Option<HuffmanDecoder>; 4] = Default::default();
    let mut restart_interval = 0usize;
    let mut frame: Option<Frame> = None;
    let mut scans = 0usize;

    loop {
        let Some(marker) = input.next_marker()? else {
            // Some encoders drop the trailing EOI
            if scans > 0 {
                break;
            }
            return Err(corrupt("unexpected end of file"));
        };

        match marker {
            SOF0 | SOF1 => {
                if frame.is_some() {
                    return Err(corrupt("more than one frame"));
                }
                match Frame::parse(input.segment()?)? {
                    Some(parsed) => frame = Some(parsed),
                    None => return Ok(None),
                }
            }
            DHT => {
                for (class, slot, table) in HuffmanDecoder::parse_segment(input.segment()?)? {
                    let tables = if class == 0 { &mut dc_tables } else { &mut ac_tables };
                    tables[slot] = Some(table);
                }
            }
            DQT => {
                // Tables swapped between scans cannot be expressed in one header
                if scans > 0 {
                    return Ok(None);
                }
                kept.push((marker, input.segment()?));
            }
            DRI => {
                let segment = input.segment()?;
                if segment.len() != 2 {
                    return Err(corrupt("bad DRI segment"));
                }
                restart_interval = u16::from_be_bytes([segment[0], segment[1]]) as usize;
            }
            SOS => {
                let frame = frame.as_mut().ok_or_else(|| corrupt("scan before frame"))?;
                let scan = ScanHeader::parse(input.segment()?, frame)?;
                let mut bits = BitReader::new(&jpeg[input.pos..]);
                decode_scan(&mut bits, frame, &scan, &dc_tables, &ac_tables, restart_interval)?;
                input.pos += bits.finish();
                scans += 1;
            }
            EOI => break,
            0xE0..=0xEF | COM => kept.push((marker, input.segment()?)),
            RST0..=RST7 => return Err(corrupt("restart marker outside a scan")),
            // Other frame types, DNL, arithmetic conditioning and anything unknown
            _ => return Ok(None),
        }
    }

    let frame = frame.ok_or_else(|| corrupt("no frame header"))?;
    if frame.components.iter().any(|c| !c.decoded) {
        return Err(corrupt("component without a scan"));
    }
    Ok(Some(write_progressive(&frame, &kept)))
}

// ── Marker segments ──────────────────────────────────────────────────────────

struct Segments<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Segments<'a> {
    /// Next marker code, skipping fill bytes. `None` at end of data.
    fn next_marker(&mut self) -> ConverterResult<Option<u8>> {
        let Some(&byte) = self.data.get(self.pos) else {
            return Ok(None);
        };
        if byte != 0xFF {
            return Err(corrupt(format!("expected a marker at offset {}", self.pos)));
        }
        while self.data.get(self.pos) == Some(&0xFF) {
            self.pos += 1;
        }
        let marker = *self.data.get(self.pos).ok_or_else(|| corrupt("truncated marker"))?;
        self.pos += 1;
        Ok(Some(marker))
    }

    /// Payload of the segment that follows a marker.
    fn segment(&mut self) -> ConverterResult<&'a [u8]> {
        let data = self.data;
        let len = match data.get(self.pos..self.pos + 2) {
            Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]) as usize,
            _ => return Err(corrupt("truncated segment length")),
        };
        if len < 2 {
            return Err(corrupt("bad segment length"));
        }
        let payload = data
            .get(self.pos + 2..self.pos + len)
            .ok_or_else(|| corrupt("truncated segment"))?;
        self.pos += len;
        Ok(payload)
    }
}

// ── Frame and scan headers ───────────────────────────────────────────────────

struct Component {
    id: u8,
    h: usize,
    v: usize,
    tq: u8,
    /// Blocks covering the component itself
    blocks_w: usize,
    blocks_h: usize,
    /// Blocks covering whole MCUs
    stride: usize,
    coefs: Vec<Block>,
    decoded: bool,
}

impl Component {
    fn block(&self, row: usize, col: usize) -> &Block {
        &self.coefs[row * self.stride + col]
    }
}

struct Frame {
    width: u16,
    height: u16,
    mcus_x: usize,
    mcus_y: usize,
    components: Vec<Component>,
}

impl Frame {
    fn parse(segment: &[u8]) -> ConverterResult<Option<Self>> {
        if segment.len() < 6 {
            return Err(corrupt("short frame header"));
        }
        let precision = segment[0];
        let height = u16::from_be_bytes([segment[1], segment[2]]);
        let width = u16::from_be_bytes([segment[3], segment[4]]);
        let count = segment[5] as usize;
        if segment.len() != 6 + 3 * count {
            return Err(corrupt("frame header length"));
        }
        // 12-bit samples, height given by DNL, or too many components for SOF2
        if precision != 8 || height == 0 || count > 4 {
            return Ok(None);
        }
        if width == 0 || count == 0 {
            return Err(corrupt("empty frame"));
        }

        let mut specs = Vec::with_capacity(count);
        for spec in segment[6..].chunks_exact(3) {
            let (h, v) = ((spec[1] >> 4) as usize, (spec[1] & 0x0F) as usize);
            if !(1..=4).contains(&h) || !(1..=4).contains(&v) || spec[2] > 3 {
                return Err(corrupt("bad component sampling"));
            }
            specs.push((spec[0], h, v, spec[2]));
        }

        let h_max = specs.iter().map(|s| s.1).max().unwrap_or(1);
        let v_max = specs.iter().map(|s| s.2).max().unwrap_or(1);
        let (w, ht) = (width as usize, height as usize);
        let mcus_x = w.div_ceil(8 * h_max);
        let mcus_y = ht.div_ceil(8 * v_max);

        let components = specs
            .into_iter()
            .map(|(id, h, v, tq)| Component {
                id,
                h,
                v,
                tq,
                blocks_w: (w * h).div_ceil(h_max).div_ceil(8),
                blocks_h: (ht * v).div_ceil(v_max).div_ceil(8),
                stride: mcus_x * h,
                coefs: vec![[0; 64]; mcus_x * h * mcus_y * v],
                decoded: false,
            })
            .collect();

        Ok(Some(Self {
            width,
            height,
            mcus_x,
            mcus_y,
            components,
        }))
    }
}

struct ScanComponent {
    index: usize,
    dc: usize,
    ac: usize,
}

struct ScanHeader {
    components: Vec<ScanComponent>,
}

impl ScanHeader {
    fn parse(segment: &[u8], frame: &Frame) -> ConverterResult<Self> {
        let count = *segment.first().ok_or_else(|| corrupt("empty scan header"))? as usize;
        if !(1..=4).contains(&count) || segment.len() != 1 + 2 * count + 3 {
            return Err(corrupt("scan header length"));
        }

        let mut components = Vec::with_capacity(count);
        for spec in segment[1..1 + 2 * count].chunks_exact(2) {
            let index = frame
                .components
                .iter()
                .position(|c| c.id == spec[0])
                .ok_or_else(|| corrupt(format!("scan names unknown component {}", spec[0])))?;
            let (dc, ac) = ((spec[1] >> 4) as usize, (spec[1] & 0x0F) as usize);
            if dc > 3 || ac > 3 {
                return Err(corrupt("bad Huffman table selector"));
            }
            components.push(ScanComponent { index, dc, ac });
        }

        let tail = &segment[1 + 2 * count..];
        if tail != [0, 63, 0] {
            return Err(corrupt("sequential scan with spectral selection"));
        }
        Ok(Self { components })
    }
}

// ── Huffman decoding ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct HuffmanDecoder {
    maxcode: [i32; 17],
    mincode: [i32; 17],
    valptr: [usize; 17],
    values: Vec<u8>,
}

impl HuffmanDecoder {
    /// Every table in one DHT segment as `(class, slot, table)`.
    fn parse_segment(mut segment: &[u8]) -> ConverterResult<Vec<(u8, usize, Self)>> {
        let mut tables = Vec::new();
        while let Some((&spec, rest)) = segment.split_first() {
            let (class, slot) = (spec >> 4, (spec & 0x0F) as usize);
            if class > 1 || slot > 3 || rest.len() < 16 {
                return Err(corrupt("bad DHT segment"));
            }
            let mut counts = [0u8; 16];
            counts.copy_from_slice(&rest[..16]);
            let total: usize = counts.iter().map(|&n| n as usize).sum();
            let values = rest
                .get(16..16 + total)
                .ok_or_else(|| corrupt("truncated DHT segment"))?;
            tables.push((class, slot, Self::new(&counts, values)?));
            segment = &rest[16 + total..];
        }
        Ok(tables)
    }

    fn new(counts: &[u8; 16], values: &[u8]) -> ConverterResult<Self> {
        let mut table = Self {
            maxcode: [-1; 17],
            mincode: [0; 17],
            valptr: [0; 17],
            values: values.to_vec(),
        };
        let mut code = 0i32;
        let mut k = 0usize;
        for len in 1..=16 {
            let n = counts[len - 1] as i32;
            if n > 0 {
                table.valptr[len] = k;
                table.mincode[len] = code;
                code += n;
                k += n as usize;
                table.maxcode[len] = code - 1;
            }
            if code > 1 << len {
                return Err(corrupt("overfull Huffman table"));
            }
            code <<= 1;
        }
        Ok(table)
    }

    fn decode(&self, bits: &mut BitReader<'_>) -> ConverterResult<u8> {
        let mut code = 0i32;
        for len in 1..=16 {
            code = (code << 1) | bits.bit()? as i32;
            if code <= self.maxcode[len] {
                let idx = self.valptr[len] + (code - self.mincode[len]) as usize;
                return self.values.get(idx).copied().ok_or_else(|| corrupt("bad Huffman code"));
            }
        }
        Err(corrupt("bad Huffman code"))
    }
}

/// Reads entropy-coded bits, undoing byte stuffing and stopping at markers.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    byte: u32,
    left: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            byte: 0,
            left: 0,
        }
    }

    fn bit(&mut self) -> ConverterResult<u32> {
        if self.left == 0 {
            let byte = match self.data.get(self.pos) {
                Some(0xFF) if self.data.get(self.pos + 1) == Some(&0x00) => {
                    self.pos += 2;
                    0xFF
                }
                Some(0xFF) | None => return Err(corrupt("entropy data ends early")),
                Some(&byte) => {
                    self.pos += 1;
                    byte
                }
            };
            self.byte = byte as u32;
            self.left = 8;
        }
        self.left -= 1;
        Ok((self.byte >> self.left) & 1)
    }

    fn receive(&mut self, size: u8) -> ConverterResult<i32> {
        let mut value = 0i32;
        for _ in 0..size {
            value = (value << 1) | self.bit()? as i32;
        }
        Ok(value)
    }

    /// Reads `size` magnitude bits and sign-extends them.
    fn receive_extend(&mut self, size: u8) -> ConverterResult<i32> {
        if size == 0 {
            return Ok(0);
        }
        let value = self.receive(size)?;
        Ok(if value < 1 << (size - 1) { value - (1 << size) + 1 } else { value })
    }

    /// Drops the padding bits and consumes the expected restart marker.
    fn restart(&mut self, expected: u8) -> ConverterResult<()> {
        self.left = 0;
        while self.data.get(self.pos) == Some(&0xFF) && self.data.get(self.pos + 1) == Some(&0xFF) {
            self.pos += 1;
        }
        if self.data.get(self.pos) != Some(&0xFF) || self.data.get(self.pos + 1) != Some(&(RST0 + expected)) {
            return Err(corrupt("missing restart marker"));
        }
        self.pos += 2;
        Ok(())
    }

    /// Offset of the marker that ends the scan.
    fn finish(self) -> usize {
        let mut pos = self.pos;
        while pos + 1 < self.data.len() {
            let next = self.data[pos + 1];
            if self.data[pos] == 0xFF && next != 0x00 && next != 0xFF && !(RST0..=RST7).contains(&next) {
                return pos;
            }
            pos += 1;
        }
        self.data.len()
    }
}

fn decode_scan(
    bits: &mut BitReader<'_>,
    frame: &mut Frame,
    scan: &ScanHeader,
    dc_tables: &[Option<HuffmanDecoder>; 4],
    ac_tables: &[Option<HuffmanDecoder>; 4],
    restart_interval: usize,
) -> ConverterResult<()> {
    let mut tables = Vec::with_capacity(scan.components.len());
    for sc in &scan.components {
        let dc = dc_tables[sc.dc].as_ref().ok_or_else(|| corrupt("missing DC table"))?;
        let ac = ac_tables[sc.ac].as_ref().ok_or_else(|| corrupt("missing AC table"))?;
        tables.push((dc, ac));
    }

    let mut preds = vec![0i32; scan.components.len()];
    let (mcus_x, mcus_y) = (frame.mcus_x, frame.mcus_y);
    let single = scan.components.len() == 1;
    let units = if single {
        let c = &frame.components[scan.components[0].index];
        c.blocks_w * c.blocks_h
    } else {
        mcus_x * mcus_y
    };

    for unit in 0..units {
        if restart_interval > 0 && unit > 0 && unit % restart_interval == 0 {
            bits.restart(((unit / restart_interval - 1) % 8) as u8)?;
            preds.fill(0);
        }

        if single {
            let c = &mut frame.components[scan.components[0].index];
            let (row, col) = (unit / c.blocks_w, unit % c.blocks_w);
            let idx = row * c.stride + col;
            decode_block(bits, tables[0].0, tables[0].1, &mut preds[0], &mut c.coefs[idx])?;
            continue;
        }

        let (mcu_row, mcu_col) = (unit / mcus_x, unit % mcus_x);
        for (slot, sc) in scan.components.iter().enumerate() {
            let c = &mut frame.components[sc.index];
            for v in 0..c.v {
                for h in 0..c.h {
                    let idx = (mcu_row * c.v + v) * c.stride + mcu_col * c.h + h;
                    decode_block(bits, tables[slot].0, tables[slot].1, &mut preds[slot], &mut c.coefs[idx])?;
                }
            }
        }
    }

    for sc in &scan.components {
        frame.components[sc.index].decoded = true;
    }
    Ok(())
}

fn decode_block(
    bits: &mut BitReader<'_>,
    dc: &HuffmanDecoder,
    ac: &HuffmanDecoder,
    pred: &mut i32,
    block: &mut Block,
) -> ConverterResult<()> {
    let size = dc.decode(bits)?;
    if size > 11 {
        return Err(corrupt("DC difference out of range"));
    }
    *pred += bits.receive_extend(size)?;
    block[0] = i16::try_from(*pred).map_err(|_| corrupt("DC coefficient out of range"))?;

    let mut k = 1;
    while k < 64 {
        let rs = ac.decode(bits)?;
        let (run, size) = ((rs >> 4) as usize, rs & 0x0F);
        if size == 0 {
            if run != 15 {
                break;
            }
            k += 16;
            continue;
        }
        k += run;
        if k > 63 || size > 10 {
            return Err(corrupt("AC coefficient out of range"));
        }
        block[k] = bits.receive_extend(size)? as i16;
        k += 1;
    }
    Ok(())
}

// ── Progressive encoding ─────────────────────────────────────────────────────

/// One progressive scan: components plus the spectral band it carries.
struct ScanSpec {
    components: Vec<usize>,
    ss: usize,
    se: usize,
}

impl ScanSpec {
    fn is_dc(&self) -> bool {
        self.ss == 0
    }

    fn table_count(&self) -> usize {
        if self.is_dc() { self.components.len() } else { 1 }
    }
}

/// DC first, then the luma AC band split in two, then each chroma band whole.
fn scan_script(frame: &Frame) -> Vec<ScanSpec> {
    let count = frame.components.len();
    let blocks_per_mcu: usize = frame.components.iter().map(|c| c.h * c.v).sum();

    let mut script = Vec::new();
    if count > 1 && blocks_per_mcu <= MAX_BLOCKS_PER_MCU {
        script.push(ScanSpec { components: (0..count).collect(), ss: 0, se: 0 });
    } else {
        script.extend((0..count).map(|i| ScanSpec { components: vec![i], ss: 0, se: 0 }));
    }
    script.push(ScanSpec { components: vec![0], ss: 1, se: 5 });
    script.push(ScanSpec { components: vec![0], ss: 6, se: 63 });
    script.extend((1..count).map(|i| ScanSpec { components: vec![i], ss: 1, se: 63 }));
    script
}

/// Receives the symbols and raw bits of one scan.
trait EntropySink {
    fn symbol(&mut self, table: usize, symbol: u8);
    fn bits(&mut self, value: u32, len: u32);
}

/// First pass: symbol frequencies per table.
struct Histogram {
    counts: Vec<[u64; 256]>,
}

impl EntropySink for Histogram {
    fn symbol(&mut self, table: usize, symbol: u8) {
        self.counts[table][symbol as usize] += 1;
    }

    fn bits(&mut self, _value: u32, _len: u32) {}
}

/// Second pass: the entropy-coded bytes.
struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    tables: &'a [HuffmanEncoder],
    acc: u64,
    count: u32,
}

impl BitWriter<'_> {
    /// Pads the last byte with one bits.
    fn finish(mut self) {
        if self.count > 0 {
            let pad = 8 - self.count;
            self.bits((1 << pad) - 1, pad);
        }
    }
}

impl EntropySink for BitWriter<'_> {
    fn symbol(&mut self, table: usize, symbol: u8) {
        let (code, len) = self.tables[table].code(symbol);
        self.bits(code, len);
    }

    fn bits(&mut self, value: u32, len: u32) {
        self.acc = (self.acc << len) | (value as u64 & ((1 << len) - 1));
        self.count += len;
        while self.count >= 8 {
            let byte = (self.acc >> (self.count - 8)) as u8;
            self.out.push(byte);
            if byte == 0xFF {
                self.out.push(0x00);
            }
            self.count -= 8;
        }
        self.acc &= (1 << self.count) - 1;
    }
}

/// Category and raw bits of a coefficient or DC difference.
fn magnitude(value: i32) -> (u8, u32) {
    let size = 32 - value.unsigned_abs().leading_zeros();
    let bits = if value < 0 { (value - 1) as u32 } else { value as u32 };
    (size as u8, bits & ((1u32 << size) - 1))
}

fn encode_scan(frame: &Frame, spec: &ScanSpec, sink: &mut impl EntropySink) {
    if spec.is_dc() {
        encode_dc_scan(frame, spec, sink);
        return;
    }

    let c = &frame.components[spec.components[0]];
    let mut eobrun = 0u32;
    for row in 0..c.blocks_h {
        for col in 0..c.blocks_w {
            encode_ac_band(c.block(row, col), spec.ss, spec.se, &mut eobrun, sink);
        }
    }
    flush_eobrun(&mut eobrun, sink);
}

fn encode_dc_scan(frame: &Frame, spec: &ScanSpec, sink: &mut impl EntropySink) {
    let mut preds = vec![0i32; spec.components.len()];

    if let &[index] = spec.components.as_slice() {
        let c = &frame.components[index];
        for row in 0..c.blocks_h {
            for col in 0..c.blocks_w {
                encode_dc(0, &mut preds[0], c.block(row, col), sink);
            }
        }
        return;
    }

    for mcu_row in 0..frame.mcus_y {
        for mcu_col in 0..frame.mcus_x {
            for (table, &index) in spec.components.iter().enumerate() {
                let c = &frame.components[index];
                for v in 0..c.v {
                    for h in 0..c.h {
                        let block = c.block(mcu_row * c.v + v, mcu_col * c.h + h);
                        encode_dc(table, &mut preds[table], block, sink);
                    }
                }
            }
        }
    }
}

fn encode_dc(table: usize, pred: &mut i32, block: &Block, sink: &mut impl EntropySink) {
    let dc = block[0] as i32;
    let (size, bits) = magnitude(dc - *pred);
    *pred = dc;
    sink.symbol(table, size);
    sink.bits(bits, size as u32);
}

fn encode_ac_band(block: &Block, ss: usize, se: usize, eobrun: &mut u32, sink: &mut impl EntropySink) {
    let mut run = 0u32;
    for &coef in &block[ss..=se] {
        if coef == 0 {
            run += 1;
            continue;
        }
        flush_eobrun(eobrun, sink);
        while run > 15 {
            sink.symbol(0, 0xF0);
            run -= 16;
        }
        let (size, bits) = magnitude(coef as i32);
        sink.symbol(0, ((run as u8) << 4) | size);
        sink.bits(bits, size as u32);
        run = 0;
    }

    if run > 0 {
        *eobrun += 1;
        if *eobrun == MAX_EOBRUN {
            flush_eobrun(eobrun, sink);
        }
    }
}

fn flush_eobrun(eobrun: &mut u32, sink: &mut impl EntropySink) {
    if *eobrun == 0 {
        return;
    }
    let nbits = 31 - eobrun.leading_zeros();
    sink.symbol(0, (nbits << 4) as u8);
    if nbits > 0 {
        sink.bits(*eobrun & ((1 << nbits) - 1), nbits);
    }
    *eobrun = 0;
}

// ── Huffman table construction ───────────────────────────────────────────────

struct HuffmanEncoder {
    counts: [u8; 16],
    symbols: Vec<u8>,
    codes: [(u32, u32); 256],
}

impl HuffmanEncoder {
    /// Length-limited optimal code for the given frequencies.
    ///
    /// One code point is reserved so no symbol is coded as all ones.
    fn optimal(freq: &[u64; 256]) -> Self {
        let mut freq: Vec<u64> = freq.iter().copied().chain([1]).collect();
        if freq[..256].iter().all(|&f| f == 0) {
            freq[0] = 1;
        }

        let mut codesize = [0usize; 257];
        let mut others = [usize::MAX; 257];
        loop {
            let Some(c1) = smallest(&freq, None) else { break };
            let Some(c2) = smallest(&freq, Some(c1)) else { break };

            freq[c1] += freq[c2];
            freq[c2] = 0;

            let mut node = c1;
            codesize[node] += 1;
            while others[node] != usize::MAX {
                node = others[node];
                codesize[node] += 1;
            }
            others[node] = c2;

            let mut node = c2;
            codesize[node] += 1;
            while others[node] != usize::MAX {
                node = others[node];
                codesize[node] += 1;
            }
        }

        let mut lengths = [0usize; 258];
        for &size in &codesize {
            if size > 0 {
                lengths[size] += 1;
            }
        }

        // Push codes longer than 16 bits back up the tree
        let mut i = lengths.len() - 1;
        while i > 16 {
            while lengths[i] > 0 {
                let mut j = i - 2;
                while lengths[j] == 0 {
                    j -= 1;
                }
                lengths[i] -= 2;
                lengths[i - 1] += 1;
                lengths[j + 1] += 2;
                lengths[j] -= 1;
            }
            i -= 1;
        }
        // Drop the reserved code point from the longest length
        while lengths[i] == 0 {
            i -= 1;
        }
        lengths[i] -= 1;

        let mut symbols = Vec::new();
        for size in 1..codesize.len() + 1 {
            symbols.extend((0..256).filter(|&s| codesize[s] == size).map(|s| s as u8));
        }

        let mut counts = [0u8; 16];
        for (len, count) in counts.iter_mut().enumerate() {
            *count = lengths[len + 1] as u8;
        }
        Self::from_counts(counts, symbols)
    }

    fn from_counts(counts: [u8; 16], symbols: Vec<u8>) -> Self {
        let mut codes = [(0u32, 0u32); 256];
        let mut code = 0u32;
        let mut next = symbols.iter();
        for (idx, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                if let Some(&symbol) = next.next() {
                    codes[symbol as usize] = (code, idx as u32 + 1);
                }
                code += 1;
            }
            code <<= 1;
        }
        Self { counts, symbols, codes }
    }

    fn code(&self, symbol: u8) -> (u32, u32) {
        self.codes[symbol as usize]
    }
}

/// Index of the smallest non-zero frequency, ties going to the higher index.
fn smallest(freq: &[u64], skip: Option<usize>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, &f) in freq.iter().enumerate() {
        if f == 0 || Some(idx) == skip {
            continue;
        }
        if best.is_none_or(|b| f <= freq[b]) {
            best = Some(idx);
        }
    }
    best
}

// ── Output ───────────────────────────────────────────────────────────────────

fn write_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

fn write_progressive(frame: &Frame, kept: &[(u8, &[u8])]) -> Vec<u8> {
    let mut out = vec![0xFF, SOI];
    for (marker, payload) in kept {
        write_segment(&mut out, *marker, payload);
    }

    let mut sof = vec![8];
    sof.extend_from_slice(&frame.height.to_be_bytes());
    sof.extend_from_slice(&frame.width.to_be_bytes());
    sof.push(frame.components.len() as u8);
    for c in &frame.components {
        sof.extend_from_slice(&[c.id, ((c.h as u8) << 4) | c.v as u8, c.tq]);
    }
    write_segment(&mut out, SOF2, &sof);

    for spec in scan_script(frame) {
        let mut histogram = Histogram {
            counts: vec![[0; 256]; spec.table_count()],
        };
        encode_scan(frame, &spec, &mut histogram);
        let tables: Vec<_> = histogram.counts.iter().map(HuffmanEncoder::optimal).collect();

        let class = if spec.is_dc() { 0x00 } else { 0x10 };
        let mut dht = Vec::new();
        for (slot, table) in tables.iter().enumerate() {
            dht.push(class | slot as u8);
            dht.extend_from_slice(&table.counts);
            dht.extend_from_slice(&table.symbols);
        }
        write_segment(&mut out, DHT, &dht);

        let mut sos = vec![spec.components.len() as u8];
        for (slot, &index) in spec.components.iter().enumerate() {
            let selector = if spec.is_dc() { (slot as u8) << 4 } else { 0 };
            sos.extend_from_slice(&[frame.components[index].id, selector]);
        }
        sos.extend_from_slice(&[spec.ss as u8, spec.se as u8, 0]);
        write_segment(&mut out, SOS, &sos);

        let mut writer = BitWriter {
            out: &mut out,
            tables: &tables,
            acc: 0,
            count: 0,
        };
        encode_scan(frame, &spec, &mut writer);
        writer.finish();
    }

    out.extend_from_slice(&[0xFF, EOI]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, GrayImage, ImageEncoder, Luma, Rgb, RgbImage};

    fn baseline_rgb(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x ^ y) * 5 % 256) as u8])
        });
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    fn baseline_gray(width: u32, height: u32) -> Vec<u8> {
        let image = GrayImage::from_fn(width, height, |x, y| Luma([((x * 3 + y * 5) % 256) as u8]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 75)
            .write_image(image.as_raw(), width, height, ExtendedColorType::L8)
            .unwrap();
        out
    }

    fn has_marker(jpeg: &[u8], marker: u8) -> bool {
        jpeg.windows(2).any(|w| w == [0xFF, marker])
    }

    fn pixels(jpeg: &[u8]) -> image::RgbImage {
        image::load_from_memory(jpeg).unwrap().to_rgb8()
    }

    #[test]
    fn colour_image_becomes_progressive_with_identical_pixels() {
        let original = baseline_rgb(37, 23);
        let progressive = transcode_progressive(&original).unwrap().unwrap();
        assert!(has_marker(&progressive, SOF2));
        assert!(!has_marker(&progressive, SOF0));
        assert_eq!(pixels(&original), pixels(&progressive));
    }

    #[test]
    fn greyscale_image_keeps_pixels() {
        let original = baseline_gray(64, 48);
        let progressive = transcode_progressive(&original).unwrap().unwrap();
        assert!(has_marker(&progressive, SOF2));
        assert_eq!(pixels(&original), pixels(&progressive));
    }

    #[test]
    fn progressive_input_is_left_alone() {
        let progressive = transcode_progressive(&baseline_rgb(16, 16)).unwrap().unwrap();
        assert!(transcode_progressive(&progressive).unwrap().is_none());
    }

    #[test]
    fn comments_are_carried_over() {
        let original = baseline_gray(16, 16);
        let mut tagged = original[..2].to_vec();
        tagged.extend_from_slice(&[0xFF, COM, 0x00, 0x07]);
        tagged.extend_from_slice(b"hello");
        tagged.extend_from_slice(&original[2..]);

        let progressive = transcode_progressive(&tagged).unwrap().unwrap();
        assert!(progressive.windows(5).any(|w| w == b"hello".as_slice()));
        assert_eq!(pixels(&original), pixels(&progressive));
    }

    #[test]
    fn damaged_input_is_an_error() {
        assert!(transcode_progressive(b"not a jpeg").is_err());
        assert!(transcode_progressive(&[0xFF, SOI, 0xFF, EOI]).is_err());

        let original = baseline_rgb(32, 32);
        let truncated = &original[..original.len() / 2];
        assert!(matches!(transcode_progressive(truncated), Err(ConverterError::Optimization(_))));
    }

    #[test]
    fn magnitude_matches_jpeg_categories() {
        assert_eq!(magnitude(0), (0, 0));
        assert_eq!(magnitude(1), (1, 1));
        assert_eq!(magnitude(-1), (1, 0));
        assert_eq!(magnitude(5), (3, 5));
        assert_eq!(magnitude(-5), (3, 2));
        assert_eq!(magnitude(-1023), (10, 0));
    }

    #[test]
    fn optimal_codes_fit_sixteen_bits_and_prefix_free() {
        // Fibonacci frequencies would produce very deep trees without limiting
        let mut freq = [0u64; 256];
        let (mut a, mut b) = (1u64, 1u64);
        for f in freq.iter_mut().take(40) {
            *f = a;
            (a, b) = (b, a + b);
        }
        let table = HuffmanEncoder::optimal(&freq);
        assert_eq!(table.symbols.len(), 40);
        assert!(table.counts.iter().map(|&n| n as usize).sum::<usize>() == 40);

        let mut codes: Vec<_> = (0..40).map(|s| table.code(s)).collect();
        assert!(codes.iter().all(|&(_, len)| (1..=16).contains(&len)));
        codes.sort_by_key(|&(code, len)| (len, code));
        for (i, &(code, len)) in codes.iter().enumerate() {
            assert_ne!(code, (1 << len) - 1, "all-ones code");
            for &(other, other_len) in &codes[i + 1..] {
                assert_ne!(other >> (other_len - len), code, "prefix clash");
            }
        }
    }
}

use std::collections::BTreeMap;

use pdfcos::ObjectId;
use pdfcos::filters::encode_all;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
enum Entry {
    Normal(u64, u16),
    Compressed(u32, u32),
    Free,
}

/// Writes small PDF files by hand, one revision after the other.
#[allow(dead_code)]
pub struct PdfBuilder {
    data: Vec<u8>,
    pending: BTreeMap<u32, Entry>,
    last_xref: Option<u64>,
}

#[allow(dead_code)]
impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut data = format!("%PDF-{version}\n").into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        PdfBuilder {
            data,
            pending: BTreeMap::new(),
            last_xref: None,
        }
    }

    pub fn offset(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Writes `id` with `body` between `obj` and `endobj`.
    pub fn object(&mut self, id: ObjectId, body: &str) -> u64 {
        self.object_bytes(id, body.as_bytes())
    }

    pub fn object_bytes(&mut self, id: ObjectId, body: &[u8]) -> u64 {
        let offset = self.offset();
        self.data.extend_from_slice(format!("{} {} obj\n", id.0, id.1).as_bytes());
        self.data.extend_from_slice(body);
        self.data.extend_from_slice(b"\nendobj\n");
        self.pending.insert(id.0, Entry::Normal(offset, id.1));
        offset
    }

    /// Writes a stream object, `dict` being the dictionary entries besides
    /// `Length`.
    pub fn stream(&mut self, id: ObjectId, dict: &str, data: &[u8]) -> u64 {
        let mut body = format!("<< {dict} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(id, &body)
    }

    /// Writes an object stream holding `objects`, flate encoded, and
    /// registers them as compressed entries.
    pub fn object_stream(&mut self, id: ObjectId, objects: &[(u32, &str)]) -> u64 {
        let mut header = String::new();
        let mut bodies = String::new();
        for (number, body) in objects {
            header.push_str(&format!("{number} {} ", bodies.len()));
            bodies.push_str(body);
            bodies.push(' ');
        }
        let content = format!("{header}{bodies}");
        let encoded = encode_all(&[&b"FlateDecode"[..]], content.as_bytes()).unwrap();
        let dict = format!(
            "/Type /ObjStm /N {} /First {} /Filter /FlateDecode",
            objects.len(),
            header.len()
        );
        let offset = self.stream(id, &dict, &encoded);
        for (index, (number, _)) in objects.iter().enumerate() {
            self.pending.insert(*number, Entry::Compressed(id.0, index as u32));
        }
        offset
    }

    pub fn free(&mut self, number: u32) {
        self.pending.insert(number, Entry::Free);
    }

    /// Replaces the first occurrence of `from` with `to`, both the same length.
    pub fn patch(&mut self, from: &[u8], to: &[u8]) {
        assert_eq!(from.len(), to.len());
        let position = self
            .data
            .windows(from.len())
            .position(|window| window == from)
            .expect("patch target");
        self.data[position..position + to.len()].copy_from_slice(to);
    }

    fn trailer_with_prev(&self, trailer: &str) -> String {
        match self.last_xref {
            Some(prev) if !trailer.contains("/Prev") => format!("{trailer} /Prev {prev}"),
            _ => trailer.to_string(),
        }
    }

    fn startxref(&mut self, offset: u64) {
        self.data.extend_from_slice(format!("startxref\n{offset}\n%%EOF\n").as_bytes());
        self.last_xref = Some(offset);
    }

    /// Writes an xref table for every object written since the last
    /// section, then the trailer. A `/Prev` to the previous section is added
    /// unless `trailer` names one.
    pub fn xref(&mut self, trailer: &str) -> u64 {
        let offset = self.offset();
        let mut table = String::from("xref\n");
        if self.last_xref.is_none() {
            table.push_str("0 1\n0000000000 65535 f\r\n");
        }
        for (number, entry) in std::mem::take(&mut self.pending) {
            match entry {
                Entry::Normal(object_offset, generation) => {
                    table.push_str(&format!("{number} 1\n{object_offset:010} {generation:05} n\r\n"))
                }
                Entry::Free => table.push_str(&format!("{number} 1\n0000000000 00001 f\r\n")),
                Entry::Compressed(..) => panic!("compressed entries need an xref stream"),
            }
        }
        let trailer = self.trailer_with_prev(trailer);
        table.push_str(&format!("trailer\n<< {trailer} >>\n"));
        self.data.extend_from_slice(table.as_bytes());
        self.startxref(offset);
        offset
    }

    fn write_xref_stream(&mut self, id: ObjectId, trailer: &str, mut entries: BTreeMap<u32, Entry>) -> u64 {
        let offset = self.offset();
        entries.insert(id.0, Entry::Normal(offset, id.1));
        let size = entries.keys().next_back().map_or(1, |max| max + 1);
        let mut index = String::new();
        let mut rows = Vec::new();
        for (number, entry) in &entries {
            index.push_str(&format!("{number} 1 "));
            let (kind, field2, field3) = match *entry {
                Entry::Normal(offset, generation) => (1_u8, offset as u32, generation),
                Entry::Compressed(container, index) => (2, container, index as u16),
                Entry::Free => (0, 0, 1),
            };
            rows.push(kind);
            rows.extend_from_slice(&field2.to_be_bytes());
            rows.extend_from_slice(&field3.to_be_bytes());
        }
        let dict = format!("/Type /XRef /W [1 4 2] /Index [{index}] /Size {size} {trailer}");
        self.stream(id, &dict, &rows);
        offset
    }

    /// Writes a cross-reference stream for every object written since the
    /// last section, itself included.
    pub fn xref_stream(&mut self, id: ObjectId, trailer: &str) -> u64 {
        let entries = std::mem::take(&mut self.pending);
        let trailer = self.trailer_with_prev(trailer);
        let offset = self.write_xref_stream(id, &trailer, entries);
        self.pending.remove(&id.0);
        self.startxref(offset);
        offset
    }

    /// Writes the cross-reference stream of a hybrid file: it takes the
    /// compressed entries, the table written next gets the others.
    pub fn hybrid_stream(&mut self, id: ObjectId) -> u64 {
        let compressed: BTreeMap<u32, Entry> = self
            .pending
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Compressed(..)))
            .map(|(number, entry)| (*number, *entry))
            .collect();
        self.pending.retain(|_, entry| !matches!(entry, Entry::Compressed(..)));
        // the stream object itself is listed in the table
        self.write_xref_stream(id, "", compressed)
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// A one revision file with a catalog, a page tree and a content stream.
#[allow(dead_code)]
pub fn simple_pdf() -> Vec<u8> {
    let mut pdf = PdfBuilder::new("1.7");
    pdf.object((1, 0), "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object((2, 0), "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object((3, 0), "<< /Type /Page /Parent 2 0 R /Contents 4 0 R /MediaBox [0 0 595 842] >>");
    pdf.stream((4, 0), "", b"BT /F1 12 Tf (Hello) Tj ET");
    pdf.xref("/Size 5 /Root 1 0 R");
    pdf.build()
}

use pdfcos::{Document, Error, LoadOptions, Object, XrefEntry, XrefError};

mod utils;
use utils::PdfBuilder;

fn first_revision(pdf: &mut PdfBuilder) -> u64 {
    pdf.object((1, 0), "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object((2, 0), "(original)");
    pdf.object((3, 0), "(doomed)");
    pdf.xref("/Size 4 /Root 1 0 R")
}

#[test]
fn newer_revision_wins() {
    let mut pdf = PdfBuilder::new("1.5");
    first_revision(&mut pdf);
    pdf.object((2, 0), "(updated)");
    pdf.free(3);
    pdf.object((4, 0), "42");
    let newest = pdf.xref("/Size 5 /Root 1 0 R /Info 4 0 R");
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert!(doc.warnings().is_empty());
    assert_eq!(doc.get_object((2, 0)).unwrap().as_str().unwrap(), b"updated");
    assert!(matches!(doc.get_object((3, 0)), Err(Error::ObjectNotFound((3, 0)))));
    assert_eq!(doc.get_object((4, 0)).unwrap().as_i64().unwrap(), 42);
    assert_eq!(doc.object_count(), 3);

    let trailer = doc.trailer();
    assert_eq!(trailer.get(b"Info").unwrap(), &Object::Reference((4, 0)));
    doc.with_xref(|xref| {
        assert_eq!(xref.section_count(), 2);
        assert_eq!(xref.start_xref(), Some(newest));
        assert!(!xref.first_trailer().has(b"Info"));
    });
}

#[test]
fn cyclic_prev_uses_first_section_reached() {
    let mut pdf = PdfBuilder::new("1.5");
    pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.object((2, 0), "(first)");
    pdf.xref("/Size 3 /Root 1 0 R /Prev 0000000000");
    pdf.object((1, 0), "<< /Type /Catalog /Version /1.5 >>");
    pdf.object((3, 0), "(second)");
    let newest = pdf.xref("/Size 4 /Root 1 0 R");
    pdf.patch(b"/Prev 0000000000", format!("/Prev {newest:010}").as_bytes());
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert_eq!(doc.warnings().len(), 1);
    assert!(matches!(doc.warnings()[0], Error::CyclicXref { offset } if offset == newest));
    assert!(matches!(doc.get_object((2, 0)), Err(Error::ObjectNotFound((2, 0)))));
    assert_eq!(doc.get_object((3, 0)).unwrap().as_str().unwrap(), b"second");
    assert!(doc.get_object((1, 0)).unwrap().as_dict().unwrap().has(b"Version"));
    doc.with_xref(|xref| assert_eq!(xref.section_count(), 1));
}

#[test]
fn prev_outside_file_is_ignored() {
    let mut pdf = PdfBuilder::new("1.5");
    pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.object((2, 0), "(only)");
    pdf.xref("/Size 3 /Root 1 0 R /Prev 999999");
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert_eq!(doc.warnings().len(), 1);
    assert!(matches!(doc.warnings()[0], Error::Xref(XrefError::PrevStart)));
    assert_eq!(doc.get_object((2, 0)).unwrap().as_str().unwrap(), b"only");
}

#[test]
fn damaged_older_section_is_ignored() {
    let mut pdf = PdfBuilder::new("1.5");
    let catalog = pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.object((2, 0), "(only)");
    // points at an object that is no cross-reference stream
    pdf.xref(&format!("/Size 3 /Root 1 0 R /Prev {catalog}"));
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert_eq!(doc.warnings().len(), 1);
    assert_eq!(doc.get_object((2, 0)).unwrap().as_str().unwrap(), b"only");
}

#[test]
fn damaged_newest_section_is_an_error() {
    let mut pdf = PdfBuilder::new("1.5");
    pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.xref("/Size 2 /Root 1 0 R");
    let mut buffer = pdf.build();
    let position = buffer.windows(4).rposition(|window| window == b"xref").unwrap();
    // "startxref" ends with "xref", the table keyword is the one before
    let table = buffer[..position].windows(4).rposition(|window| window == b"xref").unwrap();
    buffer[table..table + 4].copy_from_slice(b"xxxx");
    assert!(Document::load_vec(buffer).is_err());
}

#[test]
fn section_limit() {
    let mut pdf = PdfBuilder::new("1.5");
    first_revision(&mut pdf);
    pdf.object((5, 0), "(five)");
    pdf.xref("/Size 6 /Root 1 0 R");
    pdf.object((6, 0), "(six)");
    pdf.xref("/Size 7 /Root 1 0 R");
    let buffer = pdf.build();

    let options = LoadOptions::builder().max_xref_sections(2).build();
    let doc = Document::load_borrowed(&buffer, &options).unwrap();
    assert!(doc.get_object((5, 0)).is_ok());
    assert!(doc.get_object((6, 0)).is_ok());
    assert!(doc.get_object((1, 0)).is_err());

    let doc = Document::load_mem(&buffer).unwrap();
    assert!(doc.get_object((1, 0)).is_ok());
}

#[test]
fn xref_stream_with_object_stream() {
    let mut pdf = PdfBuilder::new("1.5");
    pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.object_stream((2, 0), &[(3, "(in stream)"), (4, "<< /A 1 >>")]);
    pdf.xref_stream((5, 0), "/Root 1 0 R");
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert!(doc.warnings().is_empty());
    let trailer = doc.trailer();
    assert_eq!(trailer.get(b"Root").unwrap(), &Object::Reference((1, 0)));
    assert!(!trailer.has(b"W"));
    assert!(!trailer.has(b"Index"));

    doc.with_xref(|xref| {
        assert_eq!(xref.entry(3), Some(&XrefEntry::Compressed { container: 2, index: 0 }));
        assert_eq!(xref.entry(4), Some(&XrefEntry::Compressed { container: 2, index: 1 }));
    });
    assert_eq!(doc.get_object((3, 0)).unwrap().as_str().unwrap(), b"in stream");
    let dict = doc.get_object((4, 0)).unwrap();
    assert_eq!(dict.as_dict().unwrap().get(b"A").unwrap().as_i64().unwrap(), 1);
    assert_eq!(doc.resolve_all().objects.len(), 5);
}

#[test]
fn table_then_xref_stream_update() {
    let mut pdf = PdfBuilder::new("1.5");
    first_revision(&mut pdf);
    pdf.object_stream((6, 0), &[(2, "(compressed update)")]);
    pdf.xref_stream((7, 0), "/Root 1 0 R");
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert_eq!(doc.get_object((2, 0)).unwrap().as_str().unwrap(), b"compressed update");
    assert_eq!(doc.get_object((3, 0)).unwrap().as_str().unwrap(), b"doomed");
}

#[test]
fn hybrid_file() {
    let mut pdf = PdfBuilder::new("1.5");
    pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.object_stream((4, 0), &[(5, "(five)"), (6, "[1 2 3]")]);
    let xref_stream = pdf.hybrid_stream((7, 0));
    pdf.xref(&format!("/Size 8 /Root 1 0 R /XRefStm {xref_stream}"));
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert!(doc.warnings().is_empty());
    assert_eq!(doc.get_object((5, 0)).unwrap().as_str().unwrap(), b"five");
    assert_eq!(doc.get_object((6, 0)).unwrap().as_array().unwrap().len(), 3);
    doc.with_xref(|xref| assert_eq!(xref.section_count(), 1));
}

#[test]
fn bad_hybrid_stream_offset_is_a_warning() {
    let mut pdf = PdfBuilder::new("1.5");
    pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.xref("/Size 2 /Root 1 0 R /XRefStm 999999");
    let doc = Document::load_vec(pdf.build()).unwrap();

    assert_eq!(doc.warnings().len(), 1);
    assert!(matches!(doc.warnings()[0], Error::Xref(XrefError::StreamStart)));
    assert!(doc.catalog().is_ok());
}

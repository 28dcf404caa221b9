use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use pdfcos::encryption::{CryptMethod, EncryptionContext, Rc4};
use pdfcos::filters::encode_all;
use pdfcos::{Document, Object, ObjectId};

mod utils;
use utils::PdfBuilder;

const OWNER: &[u8] = b"\x8c\x01\xff\x10owner entry";

fn hex(bytes: &[u8]) -> String {
    let digits: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
    format!("<{digits}>")
}

fn rc4(file_key: &[u8], id: ObjectId, data: &[u8]) -> Vec<u8> {
    let key = CryptMethod::Rc4.object_key(file_key, id).unwrap();
    Rc4::new(key).unwrap().encrypt(data)
}

fn aes128(file_key: &[u8], id: ObjectId, data: &[u8]) -> Vec<u8> {
    let key = CryptMethod::Aes128.object_key(file_key, id).unwrap();
    let iv = [id.0 as u8; 16];
    let mut buf = vec![0_u8; (data.len() / 16 + 1) * 16];
    buf[..data.len()].copy_from_slice(data);
    let encrypted = cbc::Encryptor::<aes::Aes128>::new_from_slices(&key, &iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .unwrap()
        .to_vec();
    let mut out = iv.to_vec();
    out.extend(encrypted);
    out
}

fn aes256(file_key: &[u8], _id: ObjectId, data: &[u8]) -> Vec<u8> {
    let iv = [0xC3_u8; 16];
    let mut buf = vec![0_u8; (data.len() / 16 + 1) * 16];
    buf[..data.len()].copy_from_slice(data);
    let encrypted = cbc::Encryptor::<aes::Aes256>::new_from_slices(file_key, &iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .unwrap()
        .to_vec();
    let mut out = iv.to_vec();
    out.extend(encrypted);
    out
}

type Cipher = fn(&[u8], ObjectId, &[u8]) -> Vec<u8>;

/// Catalog, an encrypted info string, an encrypted flate stream and the
/// `/Encrypt` dictionary as object 5.
fn encrypted_pdf(file_key: &[u8], encrypt: &str, cipher: Cipher) -> Vec<u8> {
    let mut pdf = PdfBuilder::new("1.6");
    pdf.object((1, 0), "<< /Type /Catalog >>");
    pdf.object((2, 0), &format!("<< /Title {} >>", hex(&cipher(file_key, (2, 0), b"Quarterly figures"))));
    let content = encode_all(&[&b"FlateDecode"[..]], &b"BT (confidential) Tj ET ".repeat(40)).unwrap();
    pdf.stream((3, 0), "/Filter /FlateDecode", &cipher(file_key, (3, 0), &content));
    pdf.object((5, 0), &format!("<< /Filter /Standard {encrypt} /O {} /P -4 >>", hex(OWNER)));
    pdf.xref("/Size 6 /Root 1 0 R /Info 2 0 R /Encrypt 5 0 R");
    pdf.build()
}

fn check_decrypted(mut doc: Document, file_key: &[u8]) {
    assert!(doc.is_encrypted());
    let encrypted_title = doc.get_object((2, 0)).unwrap();
    assert_ne!(encrypted_title.as_dict().unwrap().get(b"Title").unwrap().as_str().unwrap(), b"Quarterly figures");

    doc.set_encryption_key(file_key).unwrap();

    let info = doc.get_object((2, 0)).unwrap();
    assert_eq!(info.as_dict().unwrap().get(b"Title").unwrap().as_str().unwrap(), b"Quarterly figures");
    assert_eq!(doc.get_stream_content((3, 0)).unwrap(), b"BT (confidential) Tj ET ".repeat(40));

    let encrypt = doc.encryption_dict().unwrap();
    assert_eq!(encrypt.get(b"O").unwrap().as_str().unwrap(), OWNER);
}

#[test]
fn rc4_document() {
    let file_key = [0x11_u8, 0x22, 0x33, 0x44, 0x55];
    let buffer = encrypted_pdf(&file_key, "/V 2 /R 3 /Length 40", rc4);
    check_decrypted(Document::load_vec(buffer).unwrap(), &file_key);
}

#[test]
fn aes128_document() {
    let file_key = [0x5A_u8; 16];
    let buffer = encrypted_pdf(
        &file_key,
        "/V 4 /R 4 /Length 128 /CF << /StdCF << /CFM /AESV2 /Length 16 >> >> /StmF /StdCF /StrF /StdCF",
        aes128,
    );
    check_decrypted(Document::load_vec(buffer).unwrap(), &file_key);
}

#[test]
fn aes256_document() {
    let file_key = [0x3C_u8; 32];
    let buffer = encrypted_pdf(
        &file_key,
        "/V 5 /R 6 /Length 256 /CF << /StdCF << /CFM /AESV3 /Length 32 >> >> /StmF /StdCF /StrF /StdCF",
        aes256,
    );
    check_decrypted(Document::load_vec(buffer).unwrap(), &file_key);
}

#[test]
fn short_key_for_aes256_fails() {
    let file_key = [0x5A_u8; 16];
    let buffer = encrypted_pdf(&file_key, "/V 4 /R 4", aes128);
    let mut doc = Document::load_vec(buffer).unwrap();
    doc.set_encryption(EncryptionContext::new(file_key, CryptMethod::Aes256));
    assert!(doc.get_stream_content((3, 0)).is_err());
    assert!(doc.get_object((2, 0)).is_err());
    assert!(doc.encryption_dict().is_ok());
}

#[test]
fn added_objects_survive_the_key() {
    let file_key = [0x11_u8, 0x22, 0x33, 0x44, 0x55];
    let buffer = encrypted_pdf(&file_key, "/V 2 /R 3 /Length 40", rc4);
    let mut doc = Document::load_vec(buffer).unwrap();
    let id = doc.add_object(7).unwrap();
    assert_eq!(id, (6, 0));
    doc.set_object((2, 0), Object::string_literal("edited"));

    doc.set_encryption_key(file_key).unwrap();

    assert_eq!(*doc.get_object(id).unwrap(), Object::Integer(7));
    assert_eq!(doc.get_object((2, 0)).unwrap().as_str().unwrap(), b"edited");
    assert_eq!(doc.get_stream_content((3, 0)).unwrap(), b"BT (confidential) Tj ET ".repeat(40));
}

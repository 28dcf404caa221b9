use std::collections::BTreeMap;
use std::str::{self, FromStr};

use log::{debug, warn};
use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while, take_while1, take_while_m_n};
use nom::character::complete::{digit0, digit1, one_of, space0};
use nom::combinator::{map, map_opt, map_res, opt, recognize, verify};
use nom::multi::{fold_many0, fold_many1, many0, many0_count};
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated};
use nom::{AsChar, IResult, Parser};
use nom_locate::LocatedSpan;

use crate::error::ParseError;
use crate::load_options::LoadOptions;
use crate::source::{SeekableSource, read_full};
use crate::xref::{XrefEntry, XrefSection};
use crate::{Dictionary, Error, Object, ObjectId, Result, Stream, StringFormat};

pub mod xref_stream;

pub(crate) type ParserInput<'a> = LocatedSpan<&'a [u8], &'a str>;
// Change this to something else that implements ParseError to get a
// different error type out of nom.
pub(crate) type NomError<'a> = nom::error::Error<ParserInput<'a>>;

pub(crate) type NomResult<'a, O, E = NomError<'a>> = IResult<ParserInput<'a>, O, E>;

/// Nesting limit for parentheses inside literal strings.
pub const MAX_BRACKET: usize = 100;

pub(crate) fn input<'a>(bytes: &'a [u8], label: &'a str) -> ParserInput<'a> {
    ParserInput::new_extra(bytes, label)
}

#[inline]
fn strip_nom<O>(r: NomResult<O>) -> Option<O> {
    r.ok().map(|(_, o)| o)
}

pub(crate) fn eol(input: ParserInput) -> NomResult<ParserInput> {
    alt((tag(&b"\r\n"[..]), tag(&b"\n"[..]), tag(&b"\r"[..]))).parse(input)
}

pub(crate) fn comment(input: ParserInput) -> NomResult<()> {
    map(
        (tag(&b"%"[..]), take_while(|c: u8| !b"\r\n".contains(&c)), eol),
        |_| (),
    )
    .parse(input)
}

#[inline]
fn is_whitespace(c: u8) -> bool {
    b" \t\n\r\0\x0C".contains(&c)
}

#[inline]
fn is_delimiter(c: u8) -> bool {
    b"()<>[]{}/%".contains(&c)
}

#[inline]
fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

#[inline]
fn is_direct_literal_string(c: u8) -> bool {
    !b"()\\\r\n".contains(&c)
}

fn white_space(input: ParserInput) -> NomResult<()> {
    map(take_while(is_whitespace), |_| ()).parse(input)
}

pub(crate) fn space(input: ParserInput) -> NomResult<()> {
    fold_many0(
        alt((map(take_while1(is_whitespace), |_| ()), comment)),
        || {},
        |_, _| (),
    )
    .parse(input)
}

fn parse_digits<T: FromStr>(digits: ParserInput) -> Option<T> {
    str::from_utf8(&digits).ok().and_then(|digits| T::from_str(digits).ok())
}

pub(crate) fn integer(input: ParserInput) -> NomResult<i64> {
    map_opt(recognize(pair(opt(one_of("+-")), digit1)), parse_digits::<i64>).parse(input)
}

fn real(input: ParserInput) -> NomResult<f32> {
    map_opt(
        recognize(pair(
            opt(one_of("+-")),
            alt((
                map((digit1, tag(&b"."[..]), digit0), |_| ()),
                map(pair(tag(&b"."[..]), digit1), |_| ()),
            )),
        )),
        parse_digits::<f32>,
    )
    .parse(input)
}

fn hex_char(input: ParserInput) -> NomResult<u8> {
    map_opt(
        verify(take(2usize), |h: &ParserInput| {
            h.fragment().iter().copied().all(AsChar::is_hex_digit)
        }),
        |x: ParserInput| str::from_utf8(&x).ok().and_then(|x| u8::from_str_radix(x, 16).ok()),
    )
    .parse(input)
}

fn oct_char(input: ParserInput) -> NomResult<u8> {
    map_opt(
        take_while_m_n(1, 3, AsChar::is_oct_digit),
        // overflow is ignored
        |x: ParserInput| {
            str::from_utf8(&x)
                .ok()
                .and_then(|x| u16::from_str_radix(x, 8).ok())
                .map(|o| o as u8)
        },
    )
    .parse(input)
}

fn name(input: ParserInput) -> NomResult<Vec<u8>> {
    preceded(
        tag(&b"/"[..]),
        many0(alt((
            preceded(tag(&b"#"[..]), hex_char),
            map_opt(take(1usize), |c: ParserInput| {
                if c[0] != b'#' && is_regular(c[0]) {
                    Some(c[0])
                } else {
                    None
                }
            }),
        ))),
    )
    .parse(input)
}

fn escape_sequence(input: ParserInput) -> NomResult<Option<u8>> {
    preceded(
        tag(&b"\\"[..]),
        alt((
            map(oct_char, Some),
            map(eol, |_| None),
            map(tag(&b"n"[..]), |_| Some(b'\n')),
            map(tag(&b"r"[..]), |_| Some(b'\r')),
            map(tag(&b"t"[..]), |_| Some(b'\t')),
            map(tag(&b"b"[..]), |_| Some(b'\x08')),
            map(tag(&b"f"[..]), |_| Some(b'\x0C')),
            map(take(1usize), |c: ParserInput| Some(c[0])),
        )),
    )
    .parse(input)
}

enum InnerLiteralString<'a> {
    Direct(ParserInput<'a>),
    Escape(Option<u8>),
    Eol(ParserInput<'a>),
    Nested(Vec<u8>),
}

impl InnerLiteralString<'_> {
    fn push(&self, output: &mut Vec<u8>) {
        match self {
            InnerLiteralString::Direct(s) | InnerLiteralString::Eol(s) => output.extend_from_slice(s),
            InnerLiteralString::Escape(e) => output.extend(e),
            InnerLiteralString::Nested(n) => output.extend_from_slice(n),
        }
    }
}

fn inner_literal_string(depth: usize) -> impl Fn(ParserInput) -> NomResult<Vec<u8>> {
    move |input| {
        fold_many0(
            alt((
                map(take_while1(is_direct_literal_string), InnerLiteralString::Direct),
                map(escape_sequence, InnerLiteralString::Escape),
                map(eol, InnerLiteralString::Eol),
                map(nested_literal_string(depth), InnerLiteralString::Nested),
            )),
            Vec::new,
            |mut out: Vec<u8>, value| {
                value.push(&mut out);
                out
            },
        )
        .parse(input)
    }
}

fn nested_literal_string(depth: usize) -> impl Fn(ParserInput) -> NomResult<Vec<u8>> {
    move |input| {
        if depth == 0 {
            map(verify(tag(&b"too deep"[..]), |_| false), |_| vec![]).parse(input)
        } else {
            map(
                delimited(tag(&b"("[..]), inner_literal_string(depth - 1), tag(&b")"[..])),
                |mut content| {
                    content.insert(0, b'(');
                    content.push(b')');
                    content
                },
            )
            .parse(input)
        }
    }
}

fn literal_string(input: ParserInput) -> NomResult<Vec<u8>> {
    delimited(tag(&b"("[..]), inner_literal_string(MAX_BRACKET), tag(&b")"[..])).parse(input)
}

#[inline]
fn hex_digit(input: ParserInput) -> NomResult<u8> {
    map_opt(take(1usize), |c: ParserInput| {
        str::from_utf8(&c).ok().and_then(|c| u8::from_str_radix(c, 16).ok())
    })
    .parse(input)
}

fn hexadecimal_string(input: ParserInput) -> NomResult<Object> {
    map(
        delimited(
            tag(&b"<"[..]),
            terminated(
                fold_many0(
                    preceded(white_space, hex_digit),
                    || -> (Vec<u8>, bool) { (Vec::new(), false) },
                    |state, c| match state {
                        (mut out, false) => {
                            out.push(c << 4);
                            (out, true)
                        }
                        (mut out, true) => {
                            if let Some(last) = out.last_mut() {
                                *last |= c;
                            }
                            (out, false)
                        }
                    },
                ),
                white_space,
            ),
            tag(&b">"[..]),
        ),
        |(bytes, _)| Object::String(bytes, StringFormat::Hexadecimal),
    )
    .parse(input)
}

fn boolean(input: ParserInput) -> NomResult<Object> {
    alt((
        map(tag(&b"true"[..]), |_| Object::Boolean(true)),
        map(tag(&b"false"[..]), |_| Object::Boolean(false)),
    ))
    .parse(input)
}

fn null(input: ParserInput) -> NomResult<Object> {
    map(tag(&b"null"[..]), |_| Object::Null).parse(input)
}

fn array(input: ParserInput) -> NomResult<Vec<Object>> {
    delimited(pair(tag(&b"["[..]), space), many0(_direct_object), tag(&b"]"[..])).parse(input)
}

pub(crate) fn dictionary(input: ParserInput) -> NomResult<Dictionary> {
    delimited(pair(tag(&b"<<"[..]), space), inner_dictionary, tag(&b">>"[..])).parse(input)
}

fn inner_dictionary(input: ParserInput) -> NomResult<Dictionary> {
    fold_many0(
        pair(terminated(name, space), _direct_object),
        Dictionary::new,
        |mut dict, (key, value)| {
            dict.set(key, value);
            dict
        },
    )
    .parse(input)
}

pub(crate) fn unsigned_int<I: FromStr>(input: ParserInput) -> NomResult<I> {
    map_opt(digit1, parse_digits::<I>).parse(input)
}

fn object_id(input: ParserInput) -> NomResult<ObjectId> {
    pair(terminated(unsigned_int, space), terminated(unsigned_int, space)).parse(input)
}

fn reference(input: ParserInput) -> NomResult<Object> {
    map(terminated(object_id, tag(&b"R"[..])), Object::Reference).parse(input)
}

fn _direct_objects(input: ParserInput) -> NomResult<Object> {
    alt((
        null,
        boolean,
        reference,
        map(real, Object::Real),
        map(integer, Object::Integer),
        map(name, Object::Name),
        map(literal_string, Object::string_literal),
        hexadecimal_string,
        map(array, Object::Array),
        map(dictionary, Object::Dictionary),
    ))
    .parse(input)
}

fn _direct_object(input: ParserInput) -> NomResult<Object> {
    terminated(_direct_objects, space).parse(input)
}

/// Parses one direct object, e.g. an entry of an object stream.
pub fn direct_object(bytes: &[u8]) -> Option<Object> {
    strip_nom(preceded(space, _direct_object).parse(input(bytes, "direct object")))
}

/// What follows `N G obj`.
pub(crate) enum ObjectBody {
    Value(Object),
    /// A stream dictionary; the data starts right after the parsed bytes.
    Stream(Dictionary),
}

fn stream_head(input: ParserInput) -> NomResult<Dictionary> {
    terminated(dictionary, (space, tag(&b"stream"[..]), space0, eol)).parse(input)
}

fn object_header(input: ParserInput) -> NomResult<ObjectId> {
    delimited(space, object_id, pair(tag(&b"obj"[..]), space)).parse(input)
}

pub(crate) fn indirect_object_head(input: ParserInput) -> NomResult<(ObjectId, ObjectBody)> {
    pair(
        object_header,
        alt((map(stream_head, ObjectBody::Stream), map(_direct_object, ObjectBody::Value))),
    )
    .parse(input)
}

fn endobj(input: ParserInput) -> NomResult<()> {
    map(pair(space, tag(&b"endobj"[..])), |_| ()).parse(input)
}

fn endstream(input: ParserInput) -> NomResult<()> {
    map(pair(space, tag(&b"endstream"[..])), |_| ()).parse(input)
}

fn xref_entries(input: ParserInput) -> NomResult<BTreeMap<u32, XrefEntry>> {
    let line_end = || map(pair(space0, eol), |_| ());
    let xref_entry = pair(
        separated_pair(unsigned_int::<u64>, tag(&b" "[..]), unsigned_int::<u32>),
        delimited(tag(&b" "[..]), map(one_of("nf"), |k| k == 'n'), line_end()),
    );
    let subsection = pair(
        separated_pair(unsigned_int::<u32>, tag(&b" "[..]), unsigned_int::<u32>),
        preceded(line_end(), many0(xref_entry)),
    );

    delimited(
        (tag(&b"xref"[..]), space0, eol),
        fold_many1(
            subsection,
            BTreeMap::new,
            |mut entries, ((start, _count), rows)| {
                for (index, ((offset, generation), in_use)) in rows.into_iter().enumerate() {
                    let Some(number) = u32::try_from(index).ok().and_then(|index| start.checked_add(index)) else {
                        break;
                    };
                    let entry = match u16::try_from(generation) {
                        Ok(generation) if in_use => XrefEntry::Normal { offset, generation },
                        _ => XrefEntry::Free,
                    };
                    entries.insert(number, entry);
                }
                entries
            },
        ),
        space,
    )
    .parse(input)
}

fn trailer(input: ParserInput) -> NomResult<Dictionary> {
    delimited(pair(tag(&b"trailer"[..]), space), dictionary, space).parse(input)
}

pub(crate) fn xref_and_trailer(input: ParserInput) -> NomResult<(BTreeMap<u32, XrefEntry>, Dictionary)> {
    preceded(space, pair(xref_entries, trailer)).parse(input)
}

/// Value of a `startxref` keyword at the start of `bytes`.
pub fn xref_start(bytes: &[u8]) -> Option<i64> {
    strip_nom(preceded((tag(&b"startxref"[..]), space), integer).parse(input(bytes, "startxref")))
}

/// Version from the `%PDF-x.y` header line.
pub fn header(bytes: &[u8]) -> Option<String> {
    strip_nom(
        map_res(
            delimited(
                tag(&b"%PDF-"[..]),
                take_while(|c: u8| !b"\r\n".contains(&c)),
                pair(eol, many0_count(comment)),
            ),
            |v: ParserInput| str::from_utf8(&v).map(|v| v.trim_end().to_owned()),
        )
        .parse(input(bytes, "header")),
    )
}

/// Parses the indirect object found at a byte offset of the origin.
///
/// Fails, rather than returning a default value, when the bytes at `offset`
/// are not the definition of `id`.
pub trait ObjectParser {
    fn parse_object_at(&self, source: &mut dyn SeekableSource, offset: u64, id: ObjectId) -> Result<Object>;

    /// Raw data of a stream that starts at `start`, `length` being `None`
    /// when the stream dictionary gives no usable length.
    fn read_stream_data(&self, source: &mut dyn SeekableSource, start: u64, length: Option<u64>) -> Result<Vec<u8>> {
        let length = length.ok_or(ParseError::InvalidStream)?;
        match start.checked_add(length) {
            Some(end) if end <= source.len()? => {}
            _ => return Err(ParseError::InvalidStream.into()),
        }
        let mut data = vec![0; length as usize];
        if length > 0 {
            source.seek(start)?;
            if read_full(source, &mut data)? < data.len() {
                return Err(ParseError::InvalidStream.into());
            }
        }
        Ok(data)
    }
}

/// Parses the cross-reference section (table and trailer, or stream) at a
/// byte offset of the origin.
pub trait XrefParser {
    fn parse_xref_and_trailer_at(&self, source: &mut dyn SeekableSource, offset: u64) -> Result<XrefSection>;
}

/// The COS syntax parser working directly on a [`SeekableSource`].
///
/// It reads only the bytes it needs: a window around the object header that
/// grows until the header parses, then the stream data if there is any.
#[derive(Debug, Clone)]
pub struct CosParser {
    recover_stream_length: bool,
    window: usize,
    buffer_capacity: usize,
}

impl Default for CosParser {
    fn default() -> Self {
        CosParser::new(&LoadOptions::default())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Largest window [`CosParser`] reads to parse one object or xref table.
pub const MAX_WINDOW: usize = 64 << 20;

const HEADER_SLACK: usize = 32;

/// Outcome of parsing one window.
enum Attempt<T> {
    Parsed(T),
    /// The input may run past the window.
    Truncated,
    Invalid,
}

impl<T> Attempt<T> {
    /// `Truncated` unless `terminator` already shows up in `window`.
    fn unless_ended(window: &[u8], terminator: &[u8]) -> Self {
        if find(window, terminator).is_some() {
            Attempt::Invalid
        } else {
            Attempt::Truncated
        }
    }
}

impl CosParser {
    pub fn new(options: &LoadOptions) -> Self {
        CosParser {
            recover_stream_length: options.recover_stream_length,
            window: 1024,
            buffer_capacity: options.filter_buffer_capacity,
        }
    }

    /// Up to `len` bytes starting at `offset`.
    fn read_window(source: &mut dyn SeekableSource, offset: u64, len: usize) -> Result<Vec<u8>> {
        let total = source.len()?;
        if offset >= total {
            return Err(Error::InvalidOffset(offset));
        }
        let len = (total - offset).min(len as u64) as usize;
        source.seek(offset)?;
        let mut window = vec![0; len];
        let filled = read_full(source, &mut window)?;
        window.truncate(filled);
        Ok(window)
    }

    /// Runs `parse` on a window starting at `offset`. The window doubles
    /// while `parse` finds it truncated, up to [`MAX_WINDOW`] or the end of
    /// the origin. `parse` also learns whether the window reaches the end of
    /// the origin.
    fn parse_growing<T, F>(&self, source: &mut dyn SeekableSource, offset: u64, mut parse: F) -> Result<Option<T>>
    where
        F: FnMut(&[u8], bool) -> Attempt<T>,
    {
        let mut size = self.window.min(MAX_WINDOW);
        loop {
            let window = Self::read_window(source, offset, size)?;
            let at_end = window.len() < size;
            match parse(&window, at_end) {
                Attempt::Parsed(parsed) => return Ok(Some(parsed)),
                Attempt::Invalid => return Ok(None),
                Attempt::Truncated if at_end => return Ok(None),
                Attempt::Truncated if size >= MAX_WINDOW => {
                    warn!("nothing parses in the {size} bytes at offset {offset}");
                    return Ok(None);
                }
                Attempt::Truncated => size = size.saturating_mul(2).min(MAX_WINDOW),
            }
        }
    }

    /// Parses the indirect object at `offset`, checking its key against
    /// `expected` if there is one.
    pub(crate) fn parse_indirect(
        &self, source: &mut dyn SeekableSource, offset: u64, expected: Option<ObjectId>,
    ) -> Result<(ObjectId, Object)> {
        let parsed = self.parse_growing(source, offset, |window, at_end| {
            let start = input(window, "indirect object");
            match object_header(start) {
                Ok(_) => {}
                // a header cut by the window fails close to its end
                Err(nom::Err::Error(err) | nom::Err::Failure(err))
                    if err.input.location_offset() + HEADER_SLACK < window.len() =>
                {
                    return Attempt::Invalid;
                }
                Err(_) => return Attempt::Truncated,
            }
            let Ok((rest, (id, body))) = indirect_object_head(start) else {
                return Attempt::unless_ended(window, b"endobj");
            };
            let consumed = window.len() - rest.len();
            match body {
                // a value cut by the window could still look valid
                ObjectBody::Value(_) if !at_end && endobj(rest).is_err() && find(rest.fragment(), b"endobj").is_none() => {
                    Attempt::Truncated
                }
                ObjectBody::Stream(_) if !at_end && rest.is_empty() => Attempt::Truncated,
                body => Attempt::Parsed((id, body, consumed)),
            }
        })?;
        let (id, body, consumed) = parsed.ok_or(ParseError::IndirectObject(offset))?;

        if let Some(expected) = expected {
            if id != expected {
                return Err(Error::ObjectIdMismatch { expected, found: id });
            }
        }

        match body {
            ObjectBody::Value(object) => Ok((id, object)),
            ObjectBody::Stream(dict) => {
                let data_start = offset + consumed as u64;
                // None while the length is an indirect object
                let declared = match dict.get(b"Length") {
                    Ok(Object::Reference(_)) => None,
                    Ok(Object::Integer(length)) => Some(u64::try_from(*length).ok()),
                    _ => Some(None),
                };
                let Some(length) = declared else {
                    return Ok((id, Object::Stream(Stream::with_position(dict, data_start))));
                };
                let content = self.read_stream_content(source, data_start, length)?;
                let mut stream = Stream::new(dict, content);
                stream.start_position = Some(data_start);
                Ok((id, Object::Stream(stream)))
            }
        }
    }

    /// Reads the raw data of a stream starting at `start`. With a `length`
    /// the data must be followed by `endstream`; without one, or when that
    /// check fails and recovery is enabled, the data runs up to the next
    /// `endstream` keyword.
    pub fn read_stream_content(&self, source: &mut dyn SeekableSource, start: u64, length: Option<u64>) -> Result<Vec<u8>> {
        if let Some(length) = length {
            if let Some(content) = Self::read_declared(source, start, length)? {
                return Ok(content);
            }
            if !self.recover_stream_length {
                return Err(ParseError::InvalidStream.into());
            }
            warn!("stream data at {start} doesn't end after its declared length {length}");
        } else if !self.recover_stream_length {
            return Err(ParseError::InvalidStream.into());
        }
        self.scan_for_endstream(source, start)
    }

    fn read_declared(source: &mut dyn SeekableSource, start: u64, length: u64) -> Result<Option<Vec<u8>>> {
        let total = source.len()?;
        let Some(end) = start.checked_add(length) else {
            return Ok(None);
        };
        if end >= total {
            return Ok(None);
        }

        let mut content = vec![0; length as usize];
        if length > 0 {
            source.seek(start)?;
            if read_full(source, &mut content)? < content.len() {
                return Ok(None);
            }
        }

        let tail = Self::read_window(source, end, 64)?;
        if endstream(input(&tail, "endstream")).is_ok() {
            Ok(Some(content))
        } else {
            Ok(None)
        }
    }

    fn scan_for_endstream(&self, source: &mut dyn SeekableSource, start: u64) -> Result<Vec<u8>> {
        const KEYWORD: &[u8] = b"endstream";

        if start >= source.len()? {
            return Err(ParseError::InvalidStream.into());
        }
        source.seek(start)?;
        let mut data = Vec::new();
        let mut chunk = vec![0; self.buffer_capacity.max(KEYWORD.len())];
        loop {
            let read = source.read(&mut chunk)?;
            if read == 0 {
                return Err(ParseError::InvalidStream.into());
            }
            let search_from = data.len().saturating_sub(KEYWORD.len());
            data.extend_from_slice(&chunk[..read]);
            if let Some(position) = find(&data[search_from..], KEYWORD) {
                data.truncate(search_from + position);
                if data.ends_with(b"\r\n") {
                    data.truncate(data.len() - 2);
                } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
                    data.truncate(data.len() - 1);
                }
                debug!("recovered {} bytes of stream data at {start}", data.len());
                return Ok(data);
            }
        }
    }

    fn starts_with_keyword(source: &mut dyn SeekableSource, offset: u64, keyword: &[u8]) -> Result<bool> {
        let window = Self::read_window(source, offset, 64)?;
        let trimmed = window
            .iter()
            .position(|c| !is_whitespace(*c))
            .map_or(&window[..0], |start| &window[start..]);
        Ok(trimmed.starts_with(keyword))
    }
}

impl ObjectParser for CosParser {
    fn parse_object_at(&self, source: &mut dyn SeekableSource, offset: u64, id: ObjectId) -> Result<Object> {
        self.parse_indirect(source, offset, Some(id)).map(|(_, object)| object)
    }

    fn read_stream_data(&self, source: &mut dyn SeekableSource, start: u64, length: Option<u64>) -> Result<Vec<u8>> {
        self.read_stream_content(source, start, length)
    }
}

impl XrefParser for CosParser {
    fn parse_xref_and_trailer_at(&self, source: &mut dyn SeekableSource, offset: u64) -> Result<XrefSection> {
        if Self::starts_with_keyword(source, offset, b"xref")? {
            let parsed = self.parse_growing(source, offset, |window, _| {
                match strip_nom(xref_and_trailer(input(window, "xref"))) {
                    Some(parsed) => Attempt::Parsed(parsed),
                    None => Attempt::unless_ended(window, b"startxref"),
                }
            })?;
            let (entries, trailer) = parsed.ok_or(crate::error::XrefError::Parse)?;
            debug!("xref table at {offset} with {} entries", entries.len());
            return Ok(XrefSection {
                start: offset,
                entries,
                trailer,
            });
        }

        let (id, object) = self
            .parse_indirect(source, offset, None)
            .map_err(|_| crate::error::XrefError::Parse)?;
        let mut stream = match object {
            Object::Stream(stream) => stream,
            _ => return Err(ParseError::InvalidXref.into()),
        };
        if stream.is_pending() {
            let start = stream.start_position.unwrap_or(offset);
            stream.content = self.read_stream_content(source, start, None)?;
        }
        debug!("xref stream {id:?} at {offset}");
        xref_stream::decode_xref_stream(stream, offset, self.buffer_capacity)
    }
}

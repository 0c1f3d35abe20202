//! Decoding and normalization of source responses.
//!
//! [`parse`] turns a raw body into a typed [`SourcePayload`]; [`normalize`]
//! turns that payload into [`RateRecord`]s. Either step fails the whole
//! response on the first problem so that no partial snapshot is stored.

use chrono::NaiveDate;
use encoding_rs::{Encoding, UTF_8};
use fxbridge_common::{format_date, parse_flexible, RateRecord, RatesError, RatesResult, Source};
use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{RuDocument, RuValute, SourcePayload, ThDetail, ThEnvelope};

/// Date format of the RU document.
const RU_DATE_FORMAT: &str = "%d.%m.%Y";

/// Decode a raw body into the payload variant for `source`.
pub fn parse(source: Source, body: &[u8]) -> RatesResult<SourcePayload> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RatesError::malformed(source.code(), "empty response body"));
    }

    match source {
        Source::Ru => parse_ru(body).map(SourcePayload::Ru),
        Source::Th => parse_th(body).map(SourcePayload::Th),
    }
}

/// Convert a payload into storable records.
pub fn normalize(payload: SourcePayload) -> RatesResult<Vec<RateRecord>> {
    let records = match payload {
        SourcePayload::Ru(document) => normalize_ru(document)?,
        SourcePayload::Th(details) => normalize_th(details)?,
    };
    debug!(count = records.len(), "Normalized records");
    Ok(records)
}

/// Charset label from the XML declaration, if the document has one.
fn declared_encoding(body: &[u8]) -> Option<Vec<u8>> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Decl(decl)) => {
                return decl
                    .encoding()
                    .and_then(Result::ok)
                    .map(|label| label.into_owned())
            }
            Ok(Event::Text(_)) => {}
            _ => return None,
        }
        buf.clear();
    }
}

/// Decode the body to UTF-8 using the charset its XML declaration names.
fn decode_xml_text(body: &[u8]) -> RatesResult<String> {
    let encoding = match Encoding::for_bom(body) {
        Some((encoding, _)) => encoding,
        None => match declared_encoding(body) {
            Some(label) => Encoding::for_label(&label).ok_or_else(|| {
                RatesError::malformed(
                    "RU",
                    format!("unknown charset {}", String::from_utf8_lossy(&label)),
                )
            })?,
            None => UTF_8,
        },
    };

    let (text, _, had_errors) = encoding.decode(body);
    if had_errors {
        return Err(RatesError::malformed(
            "RU",
            format!("body is not valid {}", encoding.name()),
        ));
    }
    Ok(text.into_owned())
}

fn parse_ru(body: &[u8]) -> RatesResult<RuDocument> {
    let text = decode_xml_text(body)?;
    quick_xml::de::from_str(&text).map_err(|e| RatesError::malformed("RU", e.to_string()))
}

fn parse_th(body: &[u8]) -> RatesResult<Vec<ThDetail>> {
    let envelope: ThEnvelope =
        serde_json::from_slice(body).map_err(|e| RatesError::malformed("TH", e.to_string()))?;

    let details = envelope
        .result
        .and_then(|result| result.data)
        .map(|data| data.data_detail)
        .unwrap_or_default();

    if details.is_empty() {
        return Err(RatesError::malformed("TH", "no data_detail entries in response"));
    }
    Ok(details)
}

fn normalize_ru(document: RuDocument) -> RatesResult<Vec<RateRecord>> {
    let date = NaiveDate::parse_from_str(document.date.trim(), RU_DATE_FORMAT)
        .map_err(|_| RatesError::malformed("RU", format!("wrong date {:?}", document.date)))?;
    if document.valutes.is_empty() {
        return Err(RatesError::malformed("RU", "parsed nil data"));
    }

    let date = format_date(date);
    document
        .valutes
        .into_iter()
        .map(|valute| {
            let rate = ru_unit_rate(&valute)?;
            Ok(RateRecord::new(
                date.clone(),
                Source::Ru.code(),
                valute.char_code,
                valute.name,
                rate.clone(),
                rate,
            ))
        })
        .collect()
}

/// Rate of one unit: `VunitRate` when present, else `Value / Nominal`.
fn ru_unit_rate(valute: &RuValute) -> RatesResult<String> {
    if let Some(rate) = valute.vunit_rate.as_deref().map(str::trim) {
        if !rate.is_empty() {
            parse_flexible(rate).map_err(|_| {
                RatesError::malformed("RU", format!("wrong VunitRate for {}", valute.char_code))
            })?;
            return Ok(rate.to_string());
        }
    }

    let value = parse_flexible(&valute.value)
        .map_err(|_| RatesError::malformed("RU", format!("wrong Value for {}", valute.char_code)))?;
    let nominal = parse_flexible(&valute.nominal)
        .map_err(|_| RatesError::malformed("RU", format!("wrong Nominal for {}", valute.char_code)))?;
    if nominal.is_zero() {
        return Err(RatesError::malformed(
            "RU",
            format!("zero Nominal for {}", valute.char_code),
        ));
    }
    Ok((value / nominal).normalize().to_string())
}

/// First integer in a currency name, e.g. 100 for "JAPAN : YEN (100 YEN)".
pub fn denomination_multiplier(name: &str) -> RatesResult<Option<Decimal>> {
    let Some(digits) = name
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())
    else {
        return Ok(None);
    };

    let multiplier: u32 = digits
        .parse()
        .map_err(|_| RatesError::malformed("TH", format!("wrong amount of currency in {:?}", name)))?;
    if multiplier == 0 {
        return Err(RatesError::malformed(
            "TH",
            format!("zero amount of currency in {:?}", name),
        ));
    }
    Ok(Some(Decimal::from(multiplier)))
}

fn per_unit(raw: &str, multiplier: Option<Decimal>, field: &str, name: &str) -> RatesResult<String> {
    let rate = parse_flexible(raw)
        .map_err(|_| RatesError::malformed("TH", format!("wrong {} for {:?}", field, name)))?;
    Ok(match multiplier {
        Some(m) => (rate / m).normalize().to_string(),
        None => raw.trim().to_string(),
    })
}

fn normalize_th(details: Vec<ThDetail>) -> RatesResult<Vec<RateRecord>> {
    let mut latest: BTreeMap<String, RateRecord> = BTreeMap::new();

    for detail in details {
        if detail.period.trim().is_empty() {
            return Err(RatesError::malformed("TH", "parsed nil data"));
        }

        let multiplier = denomination_multiplier(&detail.currency_name_eng)?;
        let buy = per_unit(&detail.buying_transfer, multiplier, "RatioBuy", &detail.currency_name_eng)?;
        let sell = per_unit(&detail.selling, multiplier, "RatioSell", &detail.currency_name_eng)?;

        let record = RateRecord::new(
            detail.period.trim(),
            Source::Th.code(),
            detail.currency_id,
            detail.currency_name_eng,
            buy,
            sell,
        );

        // ISO dates order lexicographically.
        match latest.get(&record.code) {
            Some(existing) if existing.date >= record.date => {}
            _ => {
                latest.insert(record.code.clone(), record);
            }
        }
    }

    Ok(latest.into_values().collect())
}

use snafu::{Snafu, ensure};

/// Errors when walking the metadata table.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum MetaError {
    #[snafu(display("metadata table extends past the encrypted region"))]
    Truncated,

    #[snafu(display("unsupported content type {value}"))]
    UnsupportedContentType { value: u32 },
}

type Result<T, E = MetaError> = std::result::Result<T, E>;

/// Content categories a package can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    /// PSX-category game (6).
    Psx,
    /// Vita game or update (21).
    VitaGame,
    /// Vita DLC (22).
    VitaDlc,
}

impl ContentCategory {
    /// Converts the raw content-type value; `None` for unsupported ones.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            6 => Some(Self::Psx),
            21 => Some(Self::VitaGame),
            22 => Some(Self::VitaDlc),
            _ => None,
        }
    }

    /// Returns the raw content-type value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Psx => 6,
            Self::VitaGame => 21,
            Self::VitaDlc => 22,
        }
    }
}

/// Record type carrying the content type.
const META_CONTENT_TYPE: u32 = 2;
/// Record type carrying the declared item index size.
const META_INDEX_INFO: u32 = 13;

/// Values collected from the plaintext metadata table.
///
/// Both fields are optional: a package without the corresponding record
/// leaves them unset, and downstream checks are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetaInfo {
    pub content_category: Option<ContentCategory>,
    pub index_size: Option<u32>,
}

impl MetaInfo {
    /// Walks `meta_count` records starting at `meta_offset` in `head`.
    ///
    /// The caller must have at least `enc_offset` bytes of `head` resident;
    /// every record is checked against that bound before it is read.
    pub fn parse(head: &[u8], meta_offset: u32, meta_count: u32, enc_offset: u64) -> Result<Self> {
        let mut info = Self::default();
        let mut offset = u64::from(meta_offset);

        for _ in 0..meta_count {
            ensure!(offset + 16 < enc_offset, TruncatedSnafu);
            let record = offset as usize;

            let record_type = get32be(head, record);
            let record_size = get32be(head, record + 4);

            match record_type {
                META_CONTENT_TYPE => {
                    let value = get32be(head, record + 8);
                    let category = ContentCategory::from_u32(value)
                        .ok_or_else(|| UnsupportedContentTypeSnafu { value }.build())?;
                    info.content_category = Some(category);
                }
                META_INDEX_INFO => {
                    info.index_size = Some(get32be(head, record + 12));
                }
                _ => {}
            }

            offset += 8 + u64::from(record_size);
        }

        Ok(info)
    }
}

fn get32be(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_be_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(record_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&record_type.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn table(records: &[Vec<u8>]) -> Vec<u8> {
        let mut head = vec![0u8; 0x100];
        for r in records {
            head.extend_from_slice(r);
        }
        // Room so the truncation bound is comfortably met.
        head.resize(head.len() + 64, 0);
        head
    }

    #[test]
    fn collects_category_and_index_size() {
        let head = table(&[
            record(2, &21u32.to_be_bytes()),
            record(99, &[0xEE; 12]),
            record(13, &[0, 0, 0, 0, 0, 0, 0x12, 0x34]),
        ]);
        let info = MetaInfo::parse(&head, 0x100, 3, head.len() as u64).unwrap();
        assert_eq!(info.content_category, Some(ContentCategory::VitaGame));
        assert_eq!(info.index_size, Some(0x1234));
    }

    #[test]
    fn accepts_all_known_categories() {
        for (raw, category) in [
            (6, ContentCategory::Psx),
            (21, ContentCategory::VitaGame),
            (22, ContentCategory::VitaDlc),
        ] {
            let head = table(&[record(2, &(raw as u32).to_be_bytes())]);
            let info = MetaInfo::parse(&head, 0x100, 1, head.len() as u64).unwrap();
            assert_eq!(info.content_category, Some(category));
            assert_eq!(category.as_u32(), raw);
        }
    }

    #[test]
    fn rejects_unknown_category() {
        let head = table(&[record(2, &99u32.to_be_bytes())]);
        assert!(matches!(
            MetaInfo::parse(&head, 0x100, 1, head.len() as u64),
            Err(MetaError::UnsupportedContentType { value: 99 })
        ));
    }

    #[test]
    fn rejects_truncated_table() {
        let head = table(&[record(2, &21u32.to_be_bytes())]);
        // Claim more records than fit before the encrypted region.
        assert!(matches!(
            MetaInfo::parse(&head, 0x100, 8, 0x110),
            Err(MetaError::Truncated)
        ));
    }

    #[test]
    fn missing_records_leave_fields_unset() {
        let head = table(&[record(99, &[1, 2, 3, 4])]);
        let info = MetaInfo::parse(&head, 0x100, 1, head.len() as u64).unwrap();
        assert_eq!(info.content_category, None);
        assert_eq!(info.index_size, None);
    }
}

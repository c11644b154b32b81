//! District code lookup tables.
//!
//! Some exports encode the district as an 8-digit administrative code
//! (`63000050` for Taipei's Zhongzheng District). These tables translate
//! the codes to district names.

use tw_parking_source_models::AreaCodeTable;

const TAIPEI: &[(&str, &str)] = &[
    ("63000010", "松山區"),
    ("63000020", "信義區"),
    ("63000030", "大安區"),
    ("63000040", "中山區"),
    ("63000050", "中正區"),
    ("63000060", "大同區"),
    ("63000070", "萬華區"),
    ("63000080", "文山區"),
    ("63000090", "南港區"),
    ("63000100", "內湖區"),
    ("63000110", "士林區"),
    ("63000120", "北投區"),
];

const NEW_TAIPEI: &[(&str, &str)] = &[
    ("65000010", "板橋區"),
    ("65000020", "三重區"),
    ("65000030", "中和區"),
    ("65000040", "永和區"),
    ("65000050", "新莊區"),
    ("65000060", "新店區"),
    ("65000070", "樹林區"),
    ("65000080", "鶯歌區"),
    ("65000090", "三峽區"),
    ("65000100", "淡水區"),
    ("65000110", "汐止區"),
    ("65000120", "瑞芳區"),
    ("65000130", "土城區"),
    ("65000140", "蘆洲區"),
    ("65000150", "五股區"),
    ("65000160", "泰山區"),
    ("65000170", "林口區"),
    ("65000180", "深坑區"),
    ("65000190", "石碇區"),
    ("65000200", "坪林區"),
    ("65000210", "三芝區"),
    ("65000220", "石門區"),
    ("65000230", "八里區"),
    ("65000240", "平溪區"),
    ("65000250", "雙溪區"),
    ("65000260", "貢寮區"),
    ("65000270", "金山區"),
    ("65000280", "萬里區"),
    ("65000290", "烏來區"),
];

/// Result of looking up an area value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistrictLookup<'a> {
    /// The value was a known code.
    Name(&'static str),
    /// The value is not a code; it is kept unchanged.
    NotACode(&'a str),
    /// The value looks like a code but is not in the table.
    Unknown(&'a str),
}

fn entries(table: AreaCodeTable) -> &'static [(&'static str, &'static str)] {
    match table {
        AreaCodeTable::Taipei => TAIPEI,
        AreaCodeTable::NewTaipei => NEW_TAIPEI,
    }
}

/// Looks up `value` in `table`. Only all-digit values are treated as codes.
#[must_use]
pub fn lookup(table: AreaCodeTable, value: &str) -> DistrictLookup<'_> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return DistrictLookup::NotACode(value);
    }

    entries(table)
        .iter()
        .find(|(code, _)| *code == value)
        .map_or(DistrictLookup::Unknown(value), |(_, name)| {
            DistrictLookup::Name(name)
        })
}

//! Package and METS fixtures

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;

/// Write a gzip-compressed tar with the given entries
///
/// The fake decrypt command copies its input unchanged, so this is also what
/// a "`.tar.gz.gpg`" download contains in tests.
pub fn write_package(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn mets(record_body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<METS:mets xmlns:METS="http://www.loc.gov/METS/" xmlns:marc="http://www.loc.gov/MARC21/slim">
  <METS:dmdSec ID="DMD1">
    <METS:mdWrap MDTYPE="MARC">
      <METS:xmlData>
        <marc:record>
          <marc:leader>00000cam a2200000 a 4500</marc:leader>
{record_body}
        </marc:record>
      </METS:xmlData>
    </METS:mdWrap>
  </METS:dmdSec>
</METS:mets>
"#
    )
}

/// METS document with one `955` field per `(location, call number)` pair
pub fn mets_with_holdings(holdings: &[(&str, &str)]) -> String {
    let fields: String = holdings
        .iter()
        .map(|(a, b)| {
            format!(
                r#"          <marc:datafield tag="955" ind1=" " ind2=" ">
            <marc:subfield code="a">{a}</marc:subfield>
            <marc:subfield code="b">{b}</marc:subfield>
          </marc:datafield>
"#
            )
        })
        .collect();
    mets(&fields)
}

/// METS document with a `001` control field
pub fn mets_with_control_number(value: &str) -> String {
    mets(&format!(
        r#"          <marc:controlfield tag="001">{value}</marc:controlfield>"#
    ))
}

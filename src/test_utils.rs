use std::{io::Write, path::Path};

use flate2::{write::GzEncoder, Compression};
use itertools::Itertools;

/// A configuration in the traditional YAML `ldndc2nc.conf` layout.
pub(crate) const EXAMPLE_YAML_CONFIG: &str = r#"
info:
  author: Jane Doe
  email: jane.doe@example.org
  institution: Example Institute
project:
  name: test run
  version: 1.5
variables:
  soilchemistry-daily.txt:
    - dC_co2_emis[kgCha-1]
    - dN_n2o_emis[kgNha-1]
    - dN_n_emis[kgNha-1]=dN_n2o_emis[kgNha-1]+dN_no_emis[kgNha-1]
  physiology-daily.txt:
    - dN_up[kgNha-1]
refdata:
  file: cellid.nc
  var: cid
"#;

/// Header of a typical soilchemistry-daily.txt file.
pub(crate) const SOILCHEM_HEADER: &str =
    "id\tdatetime\tyear\tjulianday\tdC_co2_emis[kgCha-1]\tdN_n2o_emis[kgNha-1]\tdN_no_emis[kgNha-1]";

/// Write `text` gzip-compressed to `path`.
pub(crate) fn write_gzip_text(path: &Path, text: &str) {
    let f = std::fs::File::create(path).expect("Creating the gzip test file should not fail");
    let mut enc = GzEncoder::new(f, Compression::default());
    enc.write_all(text.as_bytes()).expect("Writing the gzip test file should not fail");
    enc.finish().expect("Finishing the gzip test file should not fail");
}

/// Write a tab separated LandscapeDNDC table with `id`, `datetime` and the
/// given data columns. Each row is `(id, date, values)`, the date as `YYYY-MM-DD`.
pub(crate) fn write_ldndc_table(path: &Path, columns: &[&str], rows: &[(u64, &str, &[f64])], gzip: bool) {
    let mut text = format!("id\tdatetime\t{}\n", columns.join("\t"));
    for (id, date, values) in rows {
        text.push_str(&format!("{id}\t{date} 00:00:00\t{}\n", values.iter().join("\t")));
    }

    if gzip {
        write_gzip_text(path, &text);
    } else {
        std::fs::write(path, text).expect("Writing the test table should not fail");
    }
}

/// Reader of delimited flat files (`;`, `,`, tab...), one record per line.
pub mod csv_reader;

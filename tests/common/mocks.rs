//! Mock version of an ItemWriter of normalized persons;
use mockall::mock;

use flatfile_batch_rs::{
    core::item::{ItemWriter, ItemWriterResult},
    person::Person,
};

mock! {
    pub PersonWriter {}
    impl ItemWriter<Person> for PersonWriter {
        fn write(&self, items: &[Person]) -> ItemWriterResult;
        fn flush(&self) -> ItemWriterResult;
        fn open(&self) -> ItemWriterResult;
        fn close(&self) -> ItemWriterResult;
    }
}

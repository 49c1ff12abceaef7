pub trait FileExtProvider {
    fn file_ext(&self) -> Option<impl AsRef<str>>;
}

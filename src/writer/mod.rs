pub mod jcamp;

pub mod box_annotator;
mod glyphs;

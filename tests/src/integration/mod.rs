//! Cross-module flows over the HTTP surface.


mod file_backed;
mod submission;
mod surface;

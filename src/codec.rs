use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Decodes uploads written in a legacy charset (sensor exports are often
/// Windows-1252) into UTF-8 chunks for the CSV reader.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    charset: &'static encoding_rs::Encoding,
    replaced: bool,
}

impl Utf8Transcoder {
    pub fn new(charset: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: charset.new_decoder(),
            charset,
            replaced: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or_else(|| src.len() * 3);
        let mut out = vec![0; capacity];

        let (_result, read, written, had_errors) = self.decoder.decode_to_utf8(src, &mut out, last);
        src.advance(read);

        if had_errors && !self.replaced {
            self.replaced = true;
            warn!(charset = self.charset.name(), "malformed input replaced while transcoding upload");
        }

        (written > 0).then(|| BytesMut::from(&out[..written]))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }
        let out = self.transcode(buf, true);
        buf.clear();
        Ok(out)
    }
}

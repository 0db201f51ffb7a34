use std::borrow::Cow;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use crate::Session;
use crate::error::check_status;
use crate::types::UploadedFile;

/// The multipart field the upload endpoint reads files from.
const FILES_FIELD: &str = "files";

impl Session {
    /// Uploads a single file using a [`Bytes`]-like payload.
    ///
    /// Cloning a [`Bytes`] is cheap, so the same payload can be uploaded many times without
    /// copying it.
    pub fn upload(&self, body: impl Into<Bytes>) -> UploadBuilder {
        UploadBuilder {
            session: self.clone(),
            body: body.into(),
            filename: None,
            content_type: Cow::Borrowed("application/octet-stream"),
        }
    }
}

/// An [`upload`](Session::upload) request builder.
#[derive(Debug)]
pub struct UploadBuilder {
    session: Session,
    body: Bytes,
    filename: Option<String>,
    content_type: Cow<'static, str>,
}

impl UploadBuilder {
    /// Sets the file name the CMS stores the file under.
    ///
    /// The CMS does not deduplicate by name, but distinct names make uploads traceable.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into()).filter(|f| !f.is_empty());
        self
    }

    /// Sets the MIME type of the uploaded file.
    pub fn content_type(mut self, content_type: impl Into<Cow<'static, str>>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

impl UploadBuilder {
    /// Sends the upload and returns the first file from the response.
    pub async fn send(self) -> crate::Result<UploadedFile> {
        let len = self.body.len() as u64;
        let mut part = Part::stream_with_length(self.body, len).mime_str(&self.content_type)?;
        if let Some(filename) = self.filename {
            part = part.file_name(filename);
        }
        let form = Form::new().part(FILES_FIELD, part);

        let response = self
            .session
            .post(&self.session.client.endpoints.upload)
            .multipart(form)
            .send()
            .await?;

        // The endpoint accepts several files per request and answers with one entry each.
        let files: Vec<UploadedFile> = check_status(response).await?.json().await?;
        files.into_iter().next().ok_or(crate::Error::EmptyUpload)
    }
}

pub(crate) mod attachment;

pub(crate) use attachment::AttachmentRecord;

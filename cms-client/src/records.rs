use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Session;
use crate::error::check_status;
use crate::types::{Envelope, NewPatient, NewTreatment, Patient, Treatment};

impl Session {
    /// Creates a patient and returns it, including its assigned document ID.
    pub async fn create_patient(&self, patient: &NewPatient) -> crate::Result<Patient> {
        self.create(&self.client.endpoints.patients, patient).await
    }

    /// Creates a treatment record.
    ///
    /// The referenced patient and photos must already exist. Any success status counts as
    /// created. The returned record is `None` if the CMS answered without the entity.
    pub async fn create_treatment(
        &self,
        treatment: &NewTreatment,
    ) -> crate::Result<Option<Treatment>> {
        let response = self
            .post(&self.client.endpoints.treatments)
            .json(&Envelope { data: treatment })
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;

        Ok(serde_json::from_slice::<Envelope<Treatment>>(&body)
            .ok()
            .map(|envelope| envelope.data))
    }

    async fn create<T, R>(&self, path: &str, data: &T) -> crate::Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response = self.post(path).json(&Envelope { data }).send().await?;
        let Envelope { data } = check_status(response).await?.json().await?;
        Ok(data)
    }
}
